//! Stage-level failure reporting.

use fundamenta::FundamentaError;
use thiserror::Error;

/// A pipeline stage failed; displayed as `stage: reason`.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub(crate) struct StageError {
    pub(crate) stage: &'static str,
    #[source]
    pub(crate) source: FundamentaError,
}

/// Attach a stage name to a failing result.
pub(crate) trait StageContext<T> {
    fn stage(self, stage: &'static str) -> Result<T, StageError>;
}

impl<T, E: Into<FundamentaError>> StageContext<T> for Result<T, E> {
    fn stage(self, stage: &'static str) -> Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            source: e.into(),
        })
    }
}
