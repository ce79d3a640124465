//! Linear and polynomial regression candidates

use serde_json::json;

use crate::error::Result;
use crate::models::{FeatureMatrix, ModelFamily, ModelSpec, TrainedModel};
use crate::stats;

/// Ordinary least squares on a polynomial expansion of each feature.
///
/// Degree 1 is plain multiple linear regression. Higher degrees add pure
/// powers per feature; cross terms are the effect decomposer's concern.
#[derive(Debug, Clone)]
pub struct LinearSpec {
    degree: usize,
}

impl LinearSpec {
    pub fn new(degree: usize) -> Result<Self> {
        if degree == 0 || degree > 4 {
            return Err(crate::error::EngineError::InvalidParameter(format!(
                "polynomial degree {} out of the supported 1..=4 range",
                degree
            )));
        }
        Ok(Self { degree })
    }
}

fn expand_row(row: &[f64], degree: usize) -> Vec<f64> {
    let mut expanded = Vec::with_capacity(1 + row.len() * degree);
    expanded.push(1.0);
    for &value in row {
        let mut power = value;
        for _ in 0..degree {
            expanded.push(power);
            power *= value;
        }
    }
    expanded
}

impl ModelSpec for LinearSpec {
    fn family(&self) -> ModelFamily {
        if self.degree == 1 {
            ModelFamily::Linear
        } else {
            ModelFamily::Polynomial
        }
    }

    fn label(&self) -> String {
        if self.degree == 1 {
            "Linear".to_string()
        } else {
            format!("Polynomial({})", self.degree)
        }
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({ "degree": self.degree })
    }

    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<Box<dyn TrainedModel>> {
        let design: Vec<Vec<f64>> = features
            .rows()
            .iter()
            .map(|r| expand_row(r, self.degree))
            .collect();
        let coefficients = stats::ols_solve(&design, target)?;
        Ok(Box::new(TrainedLinear {
            degree: self.degree,
            coefficients,
        }))
    }
}

/// Fitted linear/polynomial model
#[derive(Debug, Clone)]
pub struct TrainedLinear {
    degree: usize,
    coefficients: Vec<f64>,
}

impl TrainedLinear {
    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl TrainedModel for TrainedLinear {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                expand_row(row, self.degree)
                    .iter()
                    .zip(self.coefficients.iter())
                    .map(|(x, c)| x * c)
                    .sum()
            })
            .collect())
    }

    fn parameter_count(&self) -> usize {
        self.coefficients.len()
    }

    fn coefficients(&self) -> Option<Vec<f64>> {
        Some(self.coefficients.clone())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        // |slope| of the degree-1 term per feature, normalized
        let n_features = (self.coefficients.len() - 1) / self.degree;
        let mut importance: Vec<f64> = (0..n_features)
            .map(|f| self.coefficients[1 + f * self.degree].abs())
            .collect();
        let total: f64 = importance.iter().sum();
        if total > f64::EPSILON {
            for v in &mut importance {
                *v /= total;
            }
        }
        Some(importance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn recovers_linear_coefficients() {
        let names = vec!["x1".to_string(), "x2".to_string()];
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![i as f64, (i as f64 * 0.7).sin() * 3.0])
            .collect();
        let target: Vec<f64> = rows.iter().map(|r| 1.5 + 2.0 * r[0] + 3.0 * r[1]).collect();
        let features = FeatureMatrix::new(names, rows).unwrap();

        let spec = LinearSpec::new(1).unwrap();
        let trained = spec.fit(&features, &target).unwrap();
        let coefs = trained.coefficients().unwrap();
        assert_approx_eq!(coefs[0], 1.5, 1e-6);
        assert_approx_eq!(coefs[1], 2.0, 1e-6);
        assert_approx_eq!(coefs[2], 3.0, 1e-6);
    }

    #[test]
    fn quadratic_fit_beats_linear_on_curved_target() {
        let names = vec!["x".to_string()];
        let rows: Vec<Vec<f64>> = (0..15).map(|i| vec![i as f64 / 3.0]).collect();
        let target: Vec<f64> = rows.iter().map(|r| 2.0 + r[0] * r[0]).collect();
        let features = FeatureMatrix::new(names, rows).unwrap();

        let quadratic = LinearSpec::new(2).unwrap().fit(&features, &target).unwrap();
        let predictions = quadratic.predict(&features).unwrap();
        assert!(crate::stats::r_squared(&target, &predictions) > 0.999);
    }
}
