//! Error types for the attribution_engine crate

use thiserror::Error;

/// Custom error types for the attribution_engine crate
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Too few periods to run a pipeline stage; non-retryable until more data arrives
    #[error("Insufficient data: have {actual} periods, need at least {required}")]
    InsufficientData { actual: usize, required: usize },

    /// Every candidate model failed to fit
    #[error("No viable model: {0}")]
    NoViableModel(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to parameter or input validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from mathematical operations
    #[error("Math error: {0}")]
    MathError(String),

    /// A pipeline stage exceeded its wall-clock budget
    #[error("Timeout in stage {stage} after {elapsed_secs:.1}s (budget {budget_secs}s)")]
    Timeout {
        stage: String,
        elapsed_secs: f64,
        budget_secs: u64,
    },

    /// A run is already in flight for the same (tenant, target metric)
    #[error("Run already in progress for tenant '{tenant_id}', metric '{metric}'")]
    RunInProgress { tenant_id: String, metric: String },

    /// The run was cancelled between stages
    #[error("Run cancelled during stage {0}")]
    Cancelled(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::CsvError(err.to_string())
    }
}
