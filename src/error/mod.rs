//! Error types for the claim cohort analysis pipeline

use arrow::error::ArrowError;

/// Errors raised while loading, preparing, matching or reporting a cohort.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// I/O failure while reading the input file or writing report artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow-level failure (CSV decode, schema projection, batch assembly)
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration is readable but inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A column named in the mapping is absent from the input
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Input data violates an expectation (unknown category, wrong type)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The propensity model could not be fitted
    #[error("Estimation error: {0}")]
    Estimation(String),

    /// Too few rows remain for a stage to run
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

/// Result type alias for cohort analysis operations
pub type Result<T> = std::result::Result<T, CohortError>;
