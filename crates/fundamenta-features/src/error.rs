//! Error types for feature derivation.

use thiserror::Error;

/// Result type for feature operations.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Errors that can occur while deriving features.
///
/// Numeric degeneracy (zero denominators, short series) is never reported
/// here; it resolves to documented sentinel values instead.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A column the stage depends on is absent from the table.
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A quarter label could not be parsed.
    #[error("Invalid quarter label: {0}")]
    InvalidQuarter(String),

    /// The table has no quarter-encoded columns at all.
    #[error("No quarter-encoded columns found in table")]
    NoQuarters,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
