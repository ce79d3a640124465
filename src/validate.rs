//! Statistical validation of optimized weights against a uniform baseline

use rayon::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ValidatorConfig;
use crate::data::CleanedDataset;
use crate::error::{EngineError, Result};
use crate::optimize::{self, DynamicWeightSet, Objective, WeightBounds};
use crate::stats;

/// Validation outcome categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    /// Triggers re-optimization with tightened bounds
    Rejected,
    /// Insufficient bootstrap signal; surfaced for review, not auto-retried
    Inconclusive,
}

/// Result of validating one weight set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Mean cross-validated score of the uniform-weight baseline
    pub baseline_score: f64,
    /// Mean cross-validated score of the optimized weights
    pub weighted_score: f64,
    /// Paired-test p-value on fold-level score differences
    pub p_value: f64,
    /// 95% percentile interval of the bootstrap improvement
    pub confidence_interval: (f64, f64),
    pub improvement_mean: f64,
    pub improvement_std: f64,
    /// Fraction of resamples where weighted beats baseline
    pub positive_rate: f64,
    /// Largest per-factor weight coefficient of variation across resamples
    pub max_weight_cv: f64,
    pub verdict: Verdict,
}

/// Validates a [`DynamicWeightSet`] by cross-validation and bootstrap
#[derive(Debug, Clone)]
pub struct WeightValidator {
    config: ValidatorConfig,
}

impl WeightValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate optimized weights on the dataset they were fit to.
    ///
    /// `bounds` are the bounds the optimizer used, re-applied when weights
    /// are refit on bootstrap resamples.
    pub fn validate(
        &self,
        weight_set: &DynamicWeightSet,
        dataset: &CleanedDataset,
        target: &str,
        bounds: WeightBounds,
    ) -> Result<ValidationResult> {
        let factors: Vec<String> = weight_set.weights.keys().cloned().collect();
        if factors.is_empty() {
            return Err(EngineError::ValidationError(
                "weight set has no factors".to_string(),
            ));
        }
        let columns: Vec<Vec<f64>> = factors
            .iter()
            .map(|f| dataset.column(f).map(|c| c.to_vec()))
            .collect::<Result<_>>()?;
        let target_values = dataset.column(target)?.to_vec();
        let n = target_values.len();

        let weights = weight_set.weight_vector(&factors);
        let uniform = vec![1.0 / factors.len() as f64; factors.len()];
        let objective = weight_set.objective;

        // Cross-validation: weighted vs baseline on the same folds
        let folds = stats::kfold_indices(n, self.config.cv_folds);
        let mut weighted_scores = Vec::with_capacity(folds.len());
        let mut baseline_scores = Vec::with_capacity(folds.len());
        for (train_idx, test_idx) in &folds {
            weighted_scores.push(fold_score(
                &columns,
                &target_values,
                &weights,
                train_idx,
                test_idx,
                objective,
            ));
            baseline_scores.push(fold_score(
                &columns,
                &target_values,
                &uniform,
                train_idx,
                test_idx,
                objective,
            ));
        }
        let (_, p_value) = stats::paired_t_test(&weighted_scores, &baseline_scores)?;
        let weighted_score = stats::mean(&weighted_scores);
        let baseline_score = stats::mean(&baseline_scores);
        let significant =
            p_value < self.config.significance_level && weighted_score > baseline_score;

        // Bootstrap: refit weights on each resample, track the improvement
        // distribution and weight stability. Resamples are independent.
        let seed = self.config.seed;
        let resamples: Vec<(Vec<f64>, f64)> = (0..self.config.bootstrap_samples)
            .into_par_iter()
            .map(|b| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(b as u64));
                let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let resampled_columns: Vec<Vec<f64>> = columns
                    .iter()
                    .map(|col| indices.iter().map(|&i| col[i]).collect())
                    .collect();
                let resampled_target: Vec<f64> =
                    indices.iter().map(|&i| target_values[i]).collect();

                let run = optimize::gradient::solve(
                    &resampled_columns,
                    &resampled_target,
                    objective,
                    bounds,
                    &weights,
                    100,
                    1e-6,
                );
                let refit = if run.converged { run.weights } else { weights.clone() };
                let improvement = optimize::composite_score(
                    &resampled_columns,
                    &resampled_target,
                    &refit,
                    objective,
                ) - optimize::composite_score(
                    &resampled_columns,
                    &resampled_target,
                    &uniform,
                    objective,
                );
                (refit, improvement)
            })
            .collect();

        let improvements: Vec<f64> = resamples.iter().map(|(_, imp)| *imp).collect();
        let improvement_mean = stats::mean(&improvements);
        let improvement_std = stats::std_dev(&improvements);
        let positive_rate = improvements.iter().filter(|v| **v > 0.0).count() as f64
            / improvements.len().max(1) as f64;
        let confidence_interval = (
            stats::quantile(&improvements, 0.025),
            stats::quantile(&improvements, 0.975),
        );

        let max_weight_cv = (0..factors.len())
            .map(|f| {
                let samples: Vec<f64> = resamples.iter().map(|(w, _)| w[f]).collect();
                let m = stats::mean(&samples);
                if m.abs() > f64::EPSILON {
                    stats::std_dev(&samples) / m.abs()
                } else {
                    f64::INFINITY
                }
            })
            .fold(0.0, f64::max);

        // Accepted requires significance, a real improvement, a stable
        // positive-improvement rate, and stable weights across resamples
        let verdict = if significant
            && weighted_score >= baseline_score
            && positive_rate >= self.config.min_positive_rate
            && max_weight_cv < self.config.max_weight_cv
        {
            Verdict::Accepted
        } else if !significant && (positive_rate - 0.5).abs() < 0.1 {
            Verdict::Inconclusive
        } else {
            Verdict::Rejected
        };

        info!(
            ?verdict,
            p_value,
            positive_rate,
            max_weight_cv,
            "weight validation complete"
        );

        Ok(ValidationResult {
            baseline_score,
            weighted_score,
            p_value,
            confidence_interval,
            improvement_mean,
            improvement_std,
            positive_rate,
            max_weight_cv,
            verdict,
        })
    }
}

/// Score one fold: the composite's simple-regression parameters come from
/// the training rows, the score from the held-out rows
fn fold_score(
    columns: &[Vec<f64>],
    target: &[f64],
    weights: &[f64],
    train_idx: &[usize],
    test_idx: &[usize],
    objective: Objective,
) -> f64 {
    let composite: Vec<f64> = (0..target.len())
        .map(|row| {
            columns
                .iter()
                .zip(weights.iter())
                .map(|(col, w)| col[row] * w)
                .sum()
        })
        .collect();

    let train_c: Vec<f64> = train_idx.iter().map(|&i| composite[i]).collect();
    let train_y: Vec<f64> = train_idx.iter().map(|&i| target[i]).collect();
    let mean_c = stats::mean(&train_c);
    let mean_y = stats::mean(&train_y);
    let mut cov = 0.0;
    let mut var_c = 0.0;
    for (c, y) in train_c.iter().zip(train_y.iter()) {
        cov += (c - mean_c) * (y - mean_y);
        var_c += (c - mean_c).powi(2);
    }
    let (slope, intercept) = if var_c > 1e-12 {
        let b = cov / var_c;
        (b, mean_y - b * mean_c)
    } else {
        (0.0, mean_y)
    };

    let test_y: Vec<f64> = test_idx.iter().map(|&i| target[i]).collect();
    let predictions: Vec<f64> = test_idx
        .iter()
        .map(|&i| intercept + slope * composite[i])
        .collect();

    match objective {
        Objective::MaximizeR2 => stats::r_squared(&test_y, &predictions),
        Objective::MinimizeMse => -stats::mse(&test_y, &predictions),
    }
}
