//! Engine configuration
//!
//! Every tunable the pipeline consults lives here so a tenant can carry its
//! own overrides. Construct with [`EngineConfig::default`] and adjust fields,
//! or deserialize a per-tenant JSON document.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Outlier detection method used by the preprocessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMethod {
    /// Flag values outside [Q1 - 1.5*IQR, Q3 + 1.5*IQR]
    Iqr,
    /// Flag values with |z| > 3
    ZScore,
}

/// Normalization method applied per column, parameters stored for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMethod {
    /// Zero mean, unit variance
    Standard,
    /// Scale into [0, 1]
    MinMax,
}

/// Preprocessing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Minimum aligned periods required before any modeling
    pub min_periods: usize,
    pub outlier_method: OutlierMethod,
    pub normalization: NormalizationMethod,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_periods: 10,
            outlier_method: OutlierMethod::Iqr,
            normalization: NormalizationMethod::Standard,
        }
    }
}

/// Model fitting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitterConfig {
    /// Polynomial degrees to sweep (degree 1 is the plain linear candidate)
    pub polynomial_degrees: Vec<usize>,
    /// (p, d, q) orders to sweep for ARIMA candidates
    pub arima_orders: Vec<(usize, usize, usize)>,
    /// Lag orders to sweep for VAR candidates
    pub var_lags: Vec<usize>,
    /// Trees in the ensemble candidate
    pub ensemble_trees: usize,
    /// Maximum tree depth for the ensemble candidate
    pub ensemble_max_depth: usize,
    /// Hidden units in the neural candidate
    pub neural_hidden: usize,
    /// Training epochs for the neural candidate
    pub neural_epochs: usize,
    /// Cross-validation folds used for candidate ranking
    pub cv_folds: usize,
    /// Seed for stochastic candidates (ensemble bagging, neural init)
    pub seed: u64,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            polynomial_degrees: vec![2, 3],
            arima_orders: vec![(1, 0, 0), (1, 1, 1), (2, 1, 1)],
            var_lags: vec![1, 2],
            ensemble_trees: 25,
            ensemble_max_depth: 4,
            neural_hidden: 8,
            neural_epochs: 300,
            cv_folds: 5,
            seed: 42,
        }
    }
}

/// Effect decomposition settings (tenant-configurable, not global constants)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Minimum coefficient share of the interaction term in the augmented
    /// fit for a synergy candidate
    pub synergy_importance_threshold: f64,
    /// Minimum cross-validated R^2 drop when the interaction is removed
    pub synergy_min_r2_delta: f64,
    /// Minimum standardized mean gap between threshold segments
    pub threshold_min_effect_size: f64,
    /// Minimum points on each side of a threshold split
    pub threshold_min_segment: usize,
    /// Maximum lag to scan for lag effects
    pub max_lag: usize,
    /// Minimum |cross-correlation| for a lag candidate
    pub lag_correlation_threshold: f64,
    /// Significance level shared by the correlation and Granger tests
    pub significance_level: f64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            synergy_importance_threshold: 0.1,
            synergy_min_r2_delta: 0.01,
            threshold_min_effect_size: 0.5,
            threshold_min_segment: 5,
            max_lag: 12,
            lag_correlation_threshold: 0.3,
            significance_level: 0.05,
        }
    }
}

/// Weight optimization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Lower bound per factor weight
    pub weight_min: f64,
    /// Upper bound per factor weight
    pub weight_max: f64,
    /// Maximum gradient-descent iterations
    pub gradient_max_iters: usize,
    /// Convergence tolerance on objective improvement
    pub gradient_tolerance: f64,
    /// Differential evolution population size
    pub de_population: usize,
    /// Differential evolution generations
    pub de_generations: usize,
    /// Seed for the population-based solver
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            weight_min: 0.01,
            weight_max: 0.5,
            gradient_max_iters: 500,
            gradient_tolerance: 1e-7,
            de_population: 30,
            de_generations: 80,
            seed: 42,
        }
    }
}

/// Weight validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Cross-validation folds for weighted-vs-baseline comparison
    pub cv_folds: usize,
    /// Bootstrap resamples
    pub bootstrap_samples: usize,
    /// Significance level for the paired test
    pub significance_level: f64,
    /// Minimum fraction of resamples where weighted beats baseline
    pub min_positive_rate: f64,
    /// Maximum per-factor weight coefficient of variation across resamples
    pub max_weight_cv: f64,
    /// Seed for resampling
    pub seed: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cv_folds: 5,
            bootstrap_samples: 100,
            significance_level: 0.05,
            min_positive_rate: 0.6,
            max_weight_cv: 0.3,
            seed: 42,
        }
    }
}

/// Drift monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// R^2 drop versus training-time metrics that counts as drift
    pub max_r2_drop: f64,
    /// Absolute prediction bias that counts as drift
    pub max_bias: f64,
    /// Minimum newly observed periods before a cycle is meaningful
    pub min_new_periods: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_r2_drop: 0.05,
            max_bias: 0.25,
            min_new_periods: 3,
        }
    }
}

/// Pipeline scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bounded worker pool size shared by a run's parallel stages
    pub workers: usize,
    /// Wall-clock budget per stage, seconds
    pub stage_budget_secs: u64,
    /// Wall-clock budget for a whole run, seconds
    pub run_budget_secs: u64,
    /// Re-optimization attempts after a rejected validation
    pub max_retries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            stage_budget_secs: 120,
            run_budget_secs: 600,
            max_retries: 3,
        }
    }
}

/// Top-level engine configuration, one instance per tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub preprocess: PreprocessConfig,
    pub fitter: FitterConfig,
    pub effects: EffectConfig,
    pub optimizer: OptimizerConfig,
    pub validator: ValidatorConfig,
    pub monitor: MonitorConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Validate cross-field constraints before a run consumes the config
    pub fn validate(&self) -> Result<()> {
        if self.preprocess.min_periods < 4 {
            return Err(EngineError::InvalidParameter(
                "min_periods must be at least 4".to_string(),
            ));
        }
        if self.optimizer.weight_min < 0.0 || self.optimizer.weight_min >= self.optimizer.weight_max
        {
            return Err(EngineError::InvalidParameter(format!(
                "weight bounds [{}, {}] are not ordered",
                self.optimizer.weight_min, self.optimizer.weight_max
            )));
        }
        if self.validator.cv_folds < 2 || self.fitter.cv_folds < 2 {
            return Err(EngineError::InvalidParameter(
                "cross-validation requires at least 2 folds".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.validator.min_positive_rate) {
            return Err(EngineError::InvalidParameter(
                "min_positive_rate must be within [0, 1]".to_string(),
            ));
        }
        if self.pipeline.workers == 0 {
            return Err(EngineError::InvalidParameter(
                "worker pool must have at least one worker".to_string(),
            ));
        }
        Ok(())
    }
}
