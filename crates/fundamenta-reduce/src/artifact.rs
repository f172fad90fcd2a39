//! JSON persistence for fitted transforms.
//!
//! Each artifact is stored as `{dir}/{name}.json`. Floats are written with
//! round-trip precision, so a reloaded transform reproduces the original
//! scores bit for bit.

use crate::error::{ReduceError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Logical name of the all-features PCA artifact.
pub const PCA_ALL: &str = "pca_all";
/// Logical name of the KPI-subset PCA artifact.
pub const PCA_KPI: &str = "pca_KPI";
/// Logical name of the K-Means artifact.
pub const KMEANS: &str = "kmeans";

/// Directory of named JSON artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact called `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Whether an artifact called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Serialize `value` under `name`, replacing any previous artifact.
    ///
    /// # Errors
    /// Returns IO or JSON errors.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(name);
        fs::write(&path, serde_json::to_vec(value)?)?;
        tracing::debug!(path = %path.display(), "saved artifact");
        Ok(path)
    }

    /// Load the artifact called `name`.
    ///
    /// # Errors
    /// Returns [`ReduceError::ArtifactNotFound`] when it does not exist.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        if !path.is_file() {
            return Err(ReduceError::ArtifactNotFound(path.display().to_string()));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
