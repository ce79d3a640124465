//! Candidate model families for relationship fitting
//!
//! Each family implements [`ModelSpec`] (an untrained configuration) and
//! produces a [`TrainedModel`] artifact. The fitter sweeps a small fixed grid
//! of specs, cross-validates each, and selects one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::{EngineError, Result};

pub mod arima;
pub mod ensemble;
pub mod linear;
pub mod neural;
pub mod var;

/// Row-major feature matrix with named columns
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.iter().any(|r| r.len() != names.len()) {
            return Err(EngineError::DataError(
                "feature matrix rows must match the column names".to_string(),
            ));
        }
        Ok(Self { names, rows })
    }

    /// Build a matrix from column slices, all the same length
    pub fn from_columns(names: Vec<String>, columns: &[&[f64]]) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(EngineError::DataError(
                "column count must match the column names".to_string(),
            ));
        }
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != n_rows) {
            return Err(EngineError::DataError(
                "all feature columns must have the same length".to_string(),
            ));
        }
        let rows = (0..n_rows)
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect();
        Ok(Self { names, rows })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[index]).collect()
    }

    /// Sub-matrix restricted to the given row indices
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

}

/// Model family identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    Linear,
    Polynomial,
    Ensemble,
    Neural,
    Arima,
    Var,
}

/// Candidate lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    Training,
    Ready,
    Failed,
}

/// Fit-quality metrics. R^2/RMSE/MAE are in-sample on the training window;
/// the information criteria are computed from out-of-fold residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub aic: f64,
    pub bic: f64,
}

impl std::fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Model Fit Metrics:")?;
        writeln!(f, "  R^2:  {:.4}", self.r2)?;
        writeln!(f, "  RMSE: {:.4}", self.rmse)?;
        writeln!(f, "  MAE:  {:.4}", self.mae)?;
        writeln!(f, "  AIC:  {:.2}", self.aic)?;
        writeln!(f, "  BIC:  {:.2}", self.bic)?;
        Ok(())
    }
}

/// Serializable record of one fitted candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    pub family: ModelFamily,
    /// Human-readable label such as `ARIMA(1,1,1)` or `Polynomial(2)`
    pub label: String,
    pub hyperparameters: serde_json::Value,
    /// Flat coefficient vector where the family has one; opaque artifacts
    /// (ensemble, neural) keep their parameters on the trained model
    pub coefficients: Option<Vec<f64>>,
    /// Feature names the model was trained on
    pub feature_names: Vec<String>,
    pub training_window: (NaiveDate, NaiveDate),
    pub metrics: ModelMetrics,
    /// Mean cross-validated R^2 across folds
    pub cv_r2: f64,
    /// Standard error of the fold R^2 values
    pub cv_r2_se: f64,
    pub status: ModelStatus,
    pub selected: bool,
}

/// An untrained model configuration
pub trait ModelSpec: Debug + Send + Sync {
    fn family(&self) -> ModelFamily;

    fn label(&self) -> String;

    fn hyperparameters(&self) -> serde_json::Value;

    /// Fit on a feature matrix and aligned target values
    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<Box<dyn TrainedModel>>;
}

/// A trained model artifact
pub trait TrainedModel: Debug + Send + Sync {
    /// Predict the target for each row of the feature matrix
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Number of fitted parameters, used for AIC/BIC
    fn parameter_count(&self) -> usize;

    /// Flat coefficient vector where the family has one
    fn coefficients(&self) -> Option<Vec<f64>> {
        None
    }

    /// Normalized per-feature importance where the family provides one
    fn feature_importance(&self) -> Option<Vec<f64>> {
        None
    }
}
