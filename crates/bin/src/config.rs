//! Pipeline configuration for the command line.
//!
//! A JSON file passed with `--config` is the base; per-command flags
//! override individual fields on top of it.

use std::path::Path;

use fundamenta::{PipelineConfig, Result};

/// Load the pipeline configuration, falling back to defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            tracing::info!(path = %path.display(), "loaded pipeline configuration");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}
