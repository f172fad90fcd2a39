//! Error type spanning every pipeline stage.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, FundamentaError>;

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum FundamentaError {
    /// Retrieval or table I/O failure
    #[error(transparent)]
    Data(#[from] fundamenta_data::DataError),

    /// Feature-engineering failure
    #[error(transparent)]
    Feature(#[from] fundamenta_features::FeatureError),

    /// Reduction or clustering failure
    #[error(transparent)]
    Reduce(#[from] fundamenta_reduce::ReduceError),

    /// Report export failure
    #[error(transparent)]
    Export(#[from] fundamenta_output::ExportError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// A required column is absent
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Invalid configuration value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
