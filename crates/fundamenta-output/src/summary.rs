//! Digest of a feature-extraction fit.

use crate::export::{ExportError, ExportFormat, Exporter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One fitted principal-component projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionSummary {
    /// Artifact name (`pca_all`, `pca_KPI`).
    pub name: String,

    /// Input columns after preprocessing.
    pub n_features: usize,

    /// Retained components.
    pub n_components: usize,

    /// Explained-variance ratio per component.
    pub explained_variance_ratio: Vec<f64>,
}

impl ProjectionSummary {
    /// Summary of one projection.
    pub fn new(name: impl Into<String>, n_features: usize, explained_variance_ratio: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            n_features,
            n_components: explained_variance_ratio.len(),
            explained_variance_ratio,
        }
    }

    /// Share of variance retained by all components.
    pub fn total_explained(&self) -> f64 {
        self.explained_variance_ratio.iter().sum()
    }
}

/// Summary of a fitted extraction: both projections and the clustering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// Rows the transforms were fitted on.
    pub rows: usize,

    /// Full-feature projection.
    pub pca_all: ProjectionSummary,

    /// KPI-only projection.
    pub pca_kpi: ProjectionSummary,

    /// Rows per cluster label.
    pub cluster_sizes: Vec<usize>,

    /// Within-cluster sum of squares of the chosen clustering.
    pub inertia: f64,

    /// When the summary was produced.
    pub created_at: DateTime<Utc>,
}

impl RunSummary {
    /// Summary stamped with the current time.
    pub fn new(
        rows: usize,
        pca_all: ProjectionSummary,
        pca_kpi: ProjectionSummary,
        cluster_sizes: Vec<usize>,
        inertia: f64,
    ) -> Self {
        Self {
            rows,
            pca_all,
            pca_kpi,
            cluster_sizes,
            inertia,
            created_at: Utc::now(),
        }
    }

    /// Number of clusters.
    pub fn n_clusters(&self) -> usize {
        self.cluster_sizes.len()
    }

    fn flat_records(&self) -> Vec<SummaryFlat> {
        let mut records = vec![
            SummaryFlat::new("rows", self.rows as f64),
            SummaryFlat::new("clusters", self.n_clusters() as f64),
            SummaryFlat::new("inertia", self.inertia),
        ];
        for projection in [&self.pca_all, &self.pca_kpi] {
            records.push(SummaryFlat::new(
                format!("{}_features", projection.name),
                projection.n_features as f64,
            ));
            records.push(SummaryFlat::new(
                format!("{}_components", projection.name),
                projection.n_components as f64,
            ));
            records.push(SummaryFlat::new(
                format!("{}_explained", projection.name),
                projection.total_explained(),
            ));
        }
        for (cluster, size) in self.cluster_sizes.iter().enumerate() {
            records.push(SummaryFlat::new(format!("cluster_{cluster}_size"), *size as f64));
        }
        records
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str("\nFeature Extraction Summary\n");
        output.push_str(&format!("Fitted on {} rows at {}\n", self.rows, self.created_at.to_rfc3339()));
        output.push_str(&"=".repeat(60));
        output.push('\n');

        output.push_str(&format!(
            "{:<12} {:>10} {:>12} {:>14}\n",
            "Projection", "Features", "Components", "Variance"
        ));
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for projection in [&self.pca_all, &self.pca_kpi] {
            output.push_str(&format!(
                "{:<12} {:>10} {:>12} {:>13.1}%\n",
                projection.name,
                projection.n_features,
                projection.n_components,
                projection.total_explained() * 100.0
            ));
        }

        output.push_str(&format!(
            "\nClusters: {} (inertia {:.4})\n",
            self.n_clusters(),
            self.inertia
        ));
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for (cluster, size) in self.cluster_sizes.iter().enumerate() {
            output.push_str(&format!("  {cluster:>3}: {size:>8}\n"));
        }
        output.push_str(&"=".repeat(60));
        output.push('\n');

        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Feature Extraction Summary\n\n");
        output.push_str(&format!("**Rows:** {}\n\n", self.rows));

        output.push_str("## Projections\n\n");
        output.push_str("| Projection | Features | Components | Variance Explained |\n");
        output.push_str("|------------|----------|------------|--------------------|\n");
        for projection in [&self.pca_all, &self.pca_kpi] {
            output.push_str(&format!(
                "| {} | {} | {} | {:.1}% |\n",
                projection.name,
                projection.n_features,
                projection.n_components,
                projection.total_explained() * 100.0
            ));
        }

        output.push_str("\n## Clusters\n\n");
        output.push_str("| Cluster | Size |\n");
        output.push_str("|---------|------|\n");
        for (cluster, size) in self.cluster_sizes.iter().enumerate() {
            output.push_str(&format!("| {cluster} | {size} |\n"));
        }

        output
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows, pca_all {}/{} ({:.1}%), pca_KPI {}/{} ({:.1}%), {} clusters",
            self.rows,
            self.pca_all.n_components,
            self.pca_all.n_features,
            self.pca_all.total_explained() * 100.0,
            self.pca_kpi.n_components,
            self.pca_kpi.n_features,
            self.pca_kpi.total_explained() * 100.0,
            self.n_clusters()
        )
    }
}

/// Flattened summary for CSV export.
#[derive(Debug, Serialize, Deserialize)]
struct SummaryFlat {
    metric: String,
    value: f64,
}

impl SummaryFlat {
    fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value,
        }
    }
}

impl Exporter for RunSummary {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for record in self.flat_records() {
                    wtr.serialize(&record)?;
                }
                let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
                Ok(String::from_utf8(bytes)?)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}
