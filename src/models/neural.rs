//! Small feed-forward network candidate
//!
//! One hidden tanh layer trained with full-batch gradient descent. Inputs are
//! already normalized by the preprocessor, so no internal scaling is applied.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde_json::json;

use crate::error::{EngineError, Result};
use crate::models::{FeatureMatrix, ModelFamily, ModelSpec, TrainedModel};

#[derive(Debug, Clone)]
pub struct NeuralSpec {
    hidden: usize,
    epochs: usize,
    learning_rate: f64,
    seed: u64,
}

impl NeuralSpec {
    pub fn new(hidden: usize, epochs: usize, seed: u64) -> Result<Self> {
        if hidden == 0 || epochs == 0 {
            return Err(EngineError::InvalidParameter(
                "neural candidate requires at least one hidden unit and one epoch".to_string(),
            ));
        }
        Ok(Self {
            hidden,
            epochs,
            learning_rate: 0.01,
            seed,
        })
    }
}

impl ModelSpec for NeuralSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::Neural
    }

    fn label(&self) -> String {
        format!("Neural({} hidden)", self.hidden)
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({
            "hidden": self.hidden,
            "epochs": self.epochs,
            "learning_rate": self.learning_rate,
            "seed": self.seed,
        })
    }

    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<Box<dyn TrainedModel>> {
        let rows = features.rows();
        if rows.is_empty() || rows.len() != target.len() {
            return Err(EngineError::DataError(
                "neural fitting requires non-empty features matching the target".to_string(),
            ));
        }
        let n_in = features.n_features();
        let n = rows.len() as f64;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let init = Normal::new(0.0, (1.0 / n_in.max(1) as f64).sqrt()).map_err(|e| {
            EngineError::MathError(format!("weight init distribution: {}", e))
        })?;

        let mut w1: Vec<Vec<f64>> = (0..self.hidden)
            .map(|_| (0..n_in).map(|_| init.sample(&mut rng)).collect())
            .collect();
        let mut b1 = vec![0.0; self.hidden];
        let mut w2: Vec<f64> = (0..self.hidden).map(|_| init.sample(&mut rng)).collect();
        let mut b2 = 0.0;

        for _ in 0..self.epochs {
            let mut grad_w1 = vec![vec![0.0; n_in]; self.hidden];
            let mut grad_b1 = vec![0.0; self.hidden];
            let mut grad_w2 = vec![0.0; self.hidden];
            let mut grad_b2 = 0.0;

            for (row, &y) in rows.iter().zip(target.iter()) {
                let mut hidden = vec![0.0; self.hidden];
                for h in 0..self.hidden {
                    let pre: f64 = w1[h]
                        .iter()
                        .zip(row.iter())
                        .map(|(w, x)| w * x)
                        .sum::<f64>()
                        + b1[h];
                    hidden[h] = pre.tanh();
                }
                let output: f64 =
                    w2.iter().zip(hidden.iter()).map(|(w, h)| w * h).sum::<f64>() + b2;

                // Squared-error backprop
                let delta_out = 2.0 * (output - y) / n;
                grad_b2 += delta_out;
                for h in 0..self.hidden {
                    grad_w2[h] += delta_out * hidden[h];
                    let delta_hidden = delta_out * w2[h] * (1.0 - hidden[h] * hidden[h]);
                    grad_b1[h] += delta_hidden;
                    for (g, x) in grad_w1[h].iter_mut().zip(row.iter()) {
                        *g += delta_hidden * x;
                    }
                }
            }

            for h in 0..self.hidden {
                for (w, g) in w1[h].iter_mut().zip(grad_w1[h].iter()) {
                    *w -= self.learning_rate * g;
                }
                b1[h] -= self.learning_rate * grad_b1[h];
                w2[h] -= self.learning_rate * grad_w2[h];
            }
            b2 -= self.learning_rate * grad_b2;
        }

        Ok(Box::new(TrainedNeural { w1, b1, w2, b2 }))
    }
}

/// Fitted feed-forward network
#[derive(Debug, Clone)]
pub struct TrainedNeural {
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: f64,
}

impl TrainedModel for TrainedNeural {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                let hidden: Vec<f64> = self
                    .w1
                    .iter()
                    .zip(self.b1.iter())
                    .map(|(weights, bias)| {
                        (weights
                            .iter()
                            .zip(row.iter())
                            .map(|(w, x)| w * x)
                            .sum::<f64>()
                            + bias)
                            .tanh()
                    })
                    .collect();
                self.w2
                    .iter()
                    .zip(hidden.iter())
                    .map(|(w, h)| w * h)
                    .sum::<f64>()
                    + self.b2
            })
            .collect())
    }

    fn parameter_count(&self) -> usize {
        let n_in = self.w1.first().map(|w| w.len()).unwrap_or(0);
        self.w1.len() * n_in + self.b1.len() + self.w2.len() + 1
    }
}
