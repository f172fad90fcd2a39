//! Offline statement source backed by one JSON file per ticker.

use super::{RawStatements, StatementSource};
use crate::error::{DataError, Result};
use std::path::{Path, PathBuf};

/// Reads `{dir}/{ticker}.json`, a serialized [`RawStatements`].
#[derive(Debug, Clone)]
pub struct JsonStatementSource {
    dir: PathBuf,
}

impl JsonStatementSource {
    /// Source rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the statements of `ticker`.
    pub fn path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.json", ticker.trim()))
    }

    /// Write `statements` for `ticker`, creating the directory.
    ///
    /// # Errors
    /// Returns IO or serialization errors.
    pub async fn store(&self, ticker: &str, statements: &RawStatements) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(statements)?;
        tokio::fs::write(self.path(ticker), body).await?;
        Ok(())
    }
}

impl StatementSource for JsonStatementSource {
    async fn fetch_statements(&self, ticker: &str) -> Result<RawStatements> {
        let path = self.path(ticker);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::MissingData {
                    symbol: ticker.to_string(),
                    reason: format!("no file at {}", path.display()),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&body)?)
    }
}
