//! VAR-style candidate: the target equation of a vector autoregression
//!
//! Regresses the target on lagged values of itself and of every factor. Only
//! the target equation is estimated; the other equations of the full VAR have
//! no consumer in this engine.

use serde_json::json;

use crate::error::{EngineError, Result};
use crate::models::{FeatureMatrix, ModelFamily, ModelSpec, TrainedModel};
use crate::stats;

#[derive(Debug, Clone)]
pub struct VarSpec {
    lag: usize,
}

impl VarSpec {
    pub fn new(lag: usize) -> Result<Self> {
        if lag == 0 {
            return Err(EngineError::InvalidParameter(
                "VAR lag order must be at least 1".to_string(),
            ));
        }
        Ok(Self { lag })
    }
}

impl ModelSpec for VarSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::Var
    }

    fn label(&self) -> String {
        format!("VAR({})", self.lag)
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({ "lag": self.lag })
    }

    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<Box<dyn TrainedModel>> {
        let n = target.len();
        if features.n_rows() != n {
            return Err(EngineError::DataError(
                "feature rows must match the target length".to_string(),
            ));
        }
        let n_factors = features.n_features();
        let n_params = 1 + self.lag * (1 + n_factors);
        if n <= self.lag + n_params {
            return Err(EngineError::InsufficientData {
                actual: n,
                required: self.lag + n_params + 1,
            });
        }

        let mut design = Vec::new();
        let mut response = Vec::new();
        for t in self.lag..n {
            let mut row = Vec::with_capacity(n_params);
            row.push(1.0);
            for lag in 1..=self.lag {
                row.push(target[t - lag]);
            }
            for j in 0..n_factors {
                for lag in 1..=self.lag {
                    row.push(features.rows()[t - lag][j]);
                }
            }
            design.push(row);
            response.push(target[t]);
        }
        let coefficients = stats::ols_solve(&design, &response)?;

        Ok(Box::new(TrainedVar {
            lag: self.lag,
            n_factors,
            coefficients,
            target_history: target.to_vec(),
            factor_history: features.rows().to_vec(),
        }))
    }
}

/// Fitted target-equation VAR artifact
#[derive(Debug, Clone)]
pub struct TrainedVar {
    lag: usize,
    n_factors: usize,
    /// [intercept, target lags, factor lags grouped per factor]
    coefficients: Vec<f64>,
    target_history: Vec<f64>,
    factor_history: Vec<Vec<f64>>,
}

impl TrainedVar {
    fn equation(&self, target_lags: &[f64], factor_rows: &[&[f64]]) -> f64 {
        let mut value = self.coefficients[0];
        let mut idx = 1;
        for lag in 0..self.lag {
            value += self.coefficients[idx] * target_lags[lag];
            idx += 1;
        }
        for j in 0..self.n_factors {
            for lag in 0..self.lag {
                value += self.coefficients[idx] * factor_rows[lag][j];
                idx += 1;
            }
        }
        value
    }
}

impl TrainedModel for TrainedVar {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_features() != self.n_factors {
            return Err(EngineError::DataError(
                "feature count differs from the trained VAR".to_string(),
            ));
        }

        if features.n_rows() == self.target_history.len() {
            // In-sample one-step-ahead; early rows echo the actual value
            let mut out = self.target_history.clone();
            for t in self.lag..self.target_history.len() {
                let target_lags: Vec<f64> =
                    (1..=self.lag).map(|l| self.target_history[t - l]).collect();
                let factor_rows: Vec<&[f64]> = (1..=self.lag)
                    .map(|l| features.rows()[t - l].as_slice())
                    .collect();
                out[t] = self.equation(&target_lags, &factor_rows);
            }
            return Ok(out);
        }

        // Roll forward from the stored history using the new factor rows
        let mut targets = self.target_history.clone();
        let mut factors = self.factor_history.clone();
        let mut out = Vec::with_capacity(features.n_rows());
        for row in features.rows() {
            factors.push(row.clone());
            let t = targets.len();
            let target_lags: Vec<f64> = (1..=self.lag).map(|l| targets[t - l]).collect();
            let factor_rows: Vec<&[f64]> = (1..=self.lag)
                .map(|l| factors[factors.len() - 1 - l].as_slice())
                .collect();
            let predicted = self.equation(&target_lags, &factor_rows);
            targets.push(predicted);
            out.push(predicted);
        }
        Ok(out)
    }

    fn parameter_count(&self) -> usize {
        self.coefficients.len()
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        Some(self.coefficients.clone())
    }
}
