//! Error types for reduction and clustering.

use thiserror::Error;

/// Result type for reduction operations.
pub type Result<T> = std::result::Result<T, ReduceError>;

/// Errors that can occur while fitting or applying transforms.
#[derive(Debug, Error)]
pub enum ReduceError {
    /// A fitted feature column is absent from the table.
    #[error("Missing feature column: {0}")]
    MissingColumn(String),

    /// A feature column contains NaN, infinity or a missing value.
    #[error("Non-finite value in column {column} at row {row}")]
    NonFinite {
        /// Offending column
        column: String,
        /// First offending row
        row: usize,
    },

    /// Dimension mismatch between a fitted transform and its input.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Insufficient data for fitting.
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// No feature columns survived preprocessing.
    #[error("No feature columns selected")]
    NoFeatures,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Artifact could not be found.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
