//! CSV and JSON export of extraction reports.
//!
//! Each report is a flat record type; a `Vec` of records renders as one CSV
//! table or one JSON array.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV output was not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Comma-separated values format.
    #[default]
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pretty" | "pretty-json" | "pretty_json" => Ok(Self::PrettyJson),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// Explained variance of one principal component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VarianceExport {
    /// Which projection the component belongs to (e.g. `pca_all`).
    pub projection: String,

    /// Component number, starting at 1.
    pub component: usize,

    /// Fraction of total variance explained by this component.
    pub ratio: f64,

    /// Fraction explained by this and all earlier components.
    pub cumulative: f64,
}

/// Within-group sum of squares for one cluster count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElbowExport {
    /// Number of clusters.
    pub k: usize,

    /// Lowest inertia over the restarts.
    pub wgss: f64,
}

/// Membership count of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSizeExport {
    /// Cluster label.
    pub cluster: u32,

    /// Number of rows assigned.
    pub size: usize,

    /// Share of all rows.
    pub share: f64,
}

/// Variance rows for one projection, with running cumulative share.
pub fn variance_rows(projection: &str, ratios: &[f64]) -> Vec<VarianceExport> {
    let mut cumulative = 0.0;
    ratios
        .iter()
        .enumerate()
        .map(|(i, ratio)| {
            cumulative += ratio;
            VarianceExport {
                projection: projection.to_string(),
                component: i + 1,
                ratio: *ratio,
                cumulative,
            }
        })
        .collect()
}

/// Elbow rows from `(k, wgss)` pairs.
pub fn elbow_rows(curve: &[(usize, f64)]) -> Vec<ElbowExport> {
    curve
        .iter()
        .map(|&(k, wgss)| ElbowExport { k, wgss })
        .collect()
}

/// Cluster-size rows; shares are 0 when there are no rows at all.
pub fn cluster_size_rows(sizes: &[usize]) -> Vec<ClusterSizeExport> {
    let total: usize = sizes.iter().sum();
    sizes
        .iter()
        .enumerate()
        .map(|(cluster, &size)| ClusterSizeExport {
            cluster: cluster as u32,
            size,
            share: if total == 0 {
                0.0
            } else {
                size as f64 / total as f64
            },
        })
        .collect()
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn records_to_string<T: Serialize>(records: &[T], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            for record in records {
                wtr.serialize(record)?;
            }
            let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
            Ok(String::from_utf8(bytes)?)
        }
        ExportFormat::Json => Ok(serde_json::to_string(records)?),
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(records)?),
    }
}

impl Exporter for Vec<VarianceExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        records_to_string(self, format)
    }
}

impl Exporter for Vec<ElbowExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        records_to_string(self, format)
    }
}

impl Exporter for Vec<ClusterSizeExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        records_to_string(self, format)
    }
}
