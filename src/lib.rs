//! # Attribution Engine
//!
//! A Rust library for modeling how business outcome metrics depend on their
//! input factors (asset spend, capability scores, intermediate value scores)
//! and for maintaining the resulting models over time.
//!
//! ## Features
//!
//! - Preprocessing of monthly business series (outlier correction,
//!   imputation, normalization, period alignment)
//! - Relationship fitting across candidate model families (linear,
//!   polynomial, ensemble, neural, ARIMA, VAR) with one-standard-error
//!   selection
//! - Effect decomposition into synergy, threshold, and lag effects with
//!   statistical confidence scores
//! - Constrained optimization of normalized per-factor weights (projected
//!   gradient descent or differential evolution)
//! - Weight validation against a uniform baseline via cross-validation and
//!   bootstrap resampling
//! - Drift monitoring of deployed bundles with automatic retraining
//!
//! ## Quick Start
//!
//! ```no_run
//! use attribution_engine::config::EngineConfig;
//! use attribution_engine::data::SeriesLoader;
//! use attribution_engine::models::ModelFamily;
//! use attribution_engine::optimize::{Objective, OptimizerMethod};
//! use attribution_engine::pipeline::{AttributionEngine, RunTrigger};
//!
//! # fn main() -> attribution_engine::Result<()> {
//! let series = SeriesLoader::from_csv("history.csv")?;
//! let engine = AttributionEngine::new(EngineConfig::default())?;
//!
//! let record = engine.trigger_run(
//!     &series,
//!     "revenue",
//!     &[ModelFamily::Linear, ModelFamily::Polynomial, ModelFamily::Ensemble],
//!     Objective::MaximizeR2,
//!     OptimizerMethod::Gradient,
//!     RunTrigger::Manual,
//! )?;
//! println!("run {} finished: {:?}", record.run_id, record.outcome);
//!
//! if let Some(bundle) = engine.query("tenant-1", "revenue") {
//!     println!("active weights: {:?}", bundle.weights.weights);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod effects;
pub mod error;
pub mod fitter;
pub mod models;
pub mod monitor;
pub mod optimize;
pub mod pipeline;
pub mod preprocess;
pub mod stats;
pub mod store;
pub mod validate;

// Re-export commonly used types
pub use crate::config::EngineConfig;
pub use crate::data::{CleanedDataset, HistoricalSeries, SeriesLoader};
pub use crate::effects::{Effect, EffectDecomposition, EffectKind};
pub use crate::error::{EngineError, Result};
pub use crate::fitter::RelationshipFitter;
pub use crate::models::{FittedModel, ModelFamily};
pub use crate::monitor::{PerformanceMonitor, PerformanceSnapshot};
pub use crate::optimize::{DynamicWeightSet, Objective, OptimizerMethod, WeightOptimizer};
pub use crate::pipeline::{AttributionEngine, RunOutcome, RunTrigger};
pub use crate::preprocess::DataPreprocessor;
pub use crate::store::{BundleKey, BundleQuery, BundleState};
pub use crate::validate::{ValidationResult, Verdict, WeightValidator};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
