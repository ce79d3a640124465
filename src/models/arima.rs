//! ARIMA candidate for the time-series model family
//!
//! Univariate on the target: differences the series `d` times, estimates AR
//! and MA terms by conditional least squares (Hannan-Rissanen style), and
//! integrates forecasts back to the original scale. In-sample predictions are
//! one-step-ahead; predictions on unseen rows are iterated forecasts from the
//! stored training history.

use serde_json::json;

use crate::error::{EngineError, Result};
use crate::models::{FeatureMatrix, ModelFamily, ModelSpec, TrainedModel};
use crate::stats;

#[derive(Debug, Clone)]
pub struct ArimaSpec {
    p: usize,
    d: usize,
    q: usize,
}

impl ArimaSpec {
    pub fn new(p: usize, d: usize, q: usize) -> Result<Self> {
        if p == 0 && q == 0 {
            return Err(EngineError::InvalidParameter(
                "ARIMA requires p > 0 or q > 0".to_string(),
            ));
        }
        if d > 2 {
            return Err(EngineError::InvalidParameter(
                "differencing order above 2 is not supported".to_string(),
            ));
        }
        Ok(Self { p, d, q })
    }
}

fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    for _ in 0..d {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

impl ModelSpec for ArimaSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::Arima
    }

    fn label(&self) -> String {
        format!("ARIMA({},{},{})", self.p, self.d, self.q)
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({ "p": self.p, "d": self.d, "q": self.q })
    }

    fn fit(&self, _features: &FeatureMatrix, target: &[f64]) -> Result<Box<dyn TrainedModel>> {
        let min_len = self.p + self.d + self.q + 3;
        if target.len() < min_len {
            return Err(EngineError::InsufficientData {
                actual: target.len(),
                required: min_len,
            });
        }

        let diffed = difference(target, self.d);

        // A (near-)constant differenced series makes the AR design singular;
        // fall back to a drift-only fit
        let drift = stats::mean(&diffed);
        if stats::std_dev(&diffed) <= 1e-8 * (1.0 + drift.abs()) {
            let residuals: Vec<f64> = diffed.iter().map(|v| v - drift).collect();
            return Ok(Box::new(TrainedArima {
                p: self.p,
                d: self.d,
                q: self.q,
                intercept: drift,
                ar_coefficients: vec![0.0; self.p],
                ma_coefficients: vec![0.0; self.q],
                history: target.to_vec(),
                diffed,
                residuals,
            }));
        }

        let max_lag = self.p.max(self.q);

        // Stage 1: AR fit for preliminary residuals
        let ar_order = self.p.max(1);
        let residuals = {
            let mut design = Vec::new();
            let mut response = Vec::new();
            for t in ar_order..diffed.len() {
                let mut row = vec![1.0];
                for lag in 1..=ar_order {
                    row.push(diffed[t - lag]);
                }
                design.push(row);
                response.push(diffed[t]);
            }
            let coefs = stats::ols_solve(&design, &response)?;
            let mut residuals = vec![0.0; diffed.len()];
            for t in ar_order..diffed.len() {
                let mut fitted = coefs[0];
                for lag in 1..=ar_order {
                    fitted += coefs[lag] * diffed[t - lag];
                }
                residuals[t] = diffed[t] - fitted;
            }
            residuals
        };

        // Stage 2: joint AR + MA regression on lagged values and residuals
        let mut design = Vec::new();
        let mut response = Vec::new();
        for t in max_lag..diffed.len() {
            let mut row = vec![1.0];
            for lag in 1..=self.p {
                row.push(diffed[t - lag]);
            }
            for lag in 1..=self.q {
                row.push(residuals[t - lag]);
            }
            design.push(row);
            response.push(diffed[t]);
        }
        let coefs = stats::ols_solve(&design, &response)?;

        let intercept = coefs[0];
        let ar_coefficients = coefs[1..=self.p].to_vec();
        let ma_coefficients = coefs[1 + self.p..].to_vec();

        // Final one-step-ahead residuals on the differenced scale
        let mut final_residuals = vec![0.0; diffed.len()];
        for t in max_lag..diffed.len() {
            let mut fitted = intercept;
            for (lag, coef) in ar_coefficients.iter().enumerate() {
                fitted += coef * diffed[t - lag - 1];
            }
            for (lag, coef) in ma_coefficients.iter().enumerate() {
                fitted += coef * final_residuals[t - lag - 1];
            }
            final_residuals[t] = diffed[t] - fitted;
        }

        Ok(Box::new(TrainedArima {
            p: self.p,
            d: self.d,
            q: self.q,
            intercept,
            ar_coefficients,
            ma_coefficients,
            history: target.to_vec(),
            diffed,
            residuals: final_residuals,
        }))
    }
}

/// Fitted ARIMA artifact
#[derive(Debug, Clone)]
pub struct TrainedArima {
    p: usize,
    d: usize,
    q: usize,
    intercept: f64,
    ar_coefficients: Vec<f64>,
    ma_coefficients: Vec<f64>,
    /// Original-scale training series
    history: Vec<f64>,
    /// Differenced training series
    diffed: Vec<f64>,
    /// One-step residuals on the differenced scale
    residuals: Vec<f64>,
}

impl TrainedArima {
    /// One-step-ahead fitted values on the original scale, aligned to the
    /// training rows. Early rows without enough lags echo the actual value.
    fn in_sample(&self) -> Vec<f64> {
        let max_lag = self.p.max(self.q);
        let offset = self.d;
        let mut out = self.history.clone();
        for t in max_lag..self.diffed.len() {
            let mut fitted = self.intercept;
            for (lag, coef) in self.ar_coefficients.iter().enumerate() {
                fitted += coef * self.diffed[t - lag - 1];
            }
            for (lag, coef) in self.ma_coefficients.iter().enumerate() {
                fitted += coef * self.residuals[t - lag - 1];
            }
            out[t + offset] = integrate_one(&self.history, t + offset, self.d, fitted);
        }
        out
    }

    /// Iterated forecasts on the original scale
    fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut diffed = self.diffed.clone();
        let mut residuals = self.residuals.clone();
        let mut levels = self.history.clone();

        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = diffed.len();
            let mut next = self.intercept;
            for (lag, coef) in self.ar_coefficients.iter().enumerate() {
                if t > lag {
                    next += coef * diffed[t - lag - 1];
                }
            }
            for (lag, coef) in self.ma_coefficients.iter().enumerate() {
                if t > lag {
                    next += coef * residuals[t - lag - 1];
                }
            }
            let level = integrate_one(&levels, levels.len(), self.d, next);
            diffed.push(next);
            residuals.push(0.0);
            levels.push(level);
            out.push(level);
        }
        out
    }
}

/// Map a predicted d-th difference at position `t` back to the level scale
fn integrate_one(levels: &[f64], t: usize, d: usize, diff_value: f64) -> f64 {
    match d {
        0 => diff_value,
        1 => diff_value + levels[t - 1],
        2 => diff_value + 2.0 * levels[t - 1] - levels[t - 2],
        _ => diff_value,
    }
}

impl TrainedModel for TrainedArima {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_rows() == self.history.len() {
            Ok(self.in_sample())
        } else {
            Ok(self.forecast(features.n_rows()))
        }
    }

    fn parameter_count(&self) -> usize {
        1 + self.p + self.q
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        let mut coefs = vec![self.intercept];
        coefs.extend_from_slice(&self.ar_coefficients);
        coefs.extend_from_slice(&self.ma_coefficients);
        Some(coefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features_of_len(n: usize) -> FeatureMatrix {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();
        FeatureMatrix::new(vec!["x".to_string()], rows).unwrap()
    }

    #[test]
    fn fits_an_autoregressive_series() {
        // y_t = 0.7 y_{t-1} + small deterministic wobble
        let mut series = vec![1.0];
        for t in 1..40 {
            let wobble = ((t * 13) % 7) as f64 * 0.01;
            series.push(0.7 * series[t - 1] + wobble);
        }
        let spec = ArimaSpec::new(1, 0, 0).unwrap();
        let trained = spec.fit(&features_of_len(series.len()), &series).unwrap();
        let coefs = trained.coefficients().unwrap();
        // coefs[1] is the AR(1) coefficient
        assert!((coefs[1] - 0.7).abs() < 0.15, "ar coefficient {}", coefs[1]);
    }

    #[test]
    fn differencing_handles_a_trend() {
        let series: Vec<f64> = (0..30).map(|i| 10.0 + 2.0 * i as f64).collect();
        let spec = ArimaSpec::new(1, 1, 0).unwrap();
        let trained = spec.fit(&features_of_len(series.len()), &series).unwrap();
        let forecast = trained.predict(&features_of_len(3)).unwrap();
        // Forecasts continue the +2 per period trend
        assert!((forecast[0] - 70.0).abs() < 1e-6, "forecast[0] = {}", forecast[0]);
        assert!((forecast[2] - 74.0).abs() < 1e-6, "forecast[2] = {}", forecast[2]);
    }

    #[test]
    fn rejects_too_short_series() {
        let series = vec![1.0, 2.0, 3.0];
        let spec = ArimaSpec::new(2, 1, 1).unwrap();
        assert!(spec.fit(&features_of_len(3), &series).is_err());
    }
}
