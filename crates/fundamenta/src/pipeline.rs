//! Train/test pipeline over the feature stages.
//!
//! Imputation, KPI derivation and growth features are computed per table;
//! the extraction transforms are fitted on the training table only and
//! replayed unchanged on the test table.

use std::fs;
use std::path::Path;

use fundamenta_data::{FetchConfig, FieldCatalog};
use fundamenta_features::{
    GrowthEngine, ImputeConfig, Imputer, KpiEngine, QoqConfig, SchemaConfig, TableSchema,
};
use fundamenta_output::{ProjectionSummary, RunSummary};
use fundamenta_reduce::{
    CLUSTER_COLUMN, ExtractionConfig, FeatureExtractor, FittedExtraction, PCA_ALL, PCA_KPI,
    PcaArtifact, cluster_sizes,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FundamentaError, Result};
use crate::universe::{CleanConfig, SplitConfig};

/// Configuration of every stage, loadable from one JSON file.
///
/// Missing sections and fields take their defaults, so a file only needs
/// the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retrieval settings
    pub fetch: FetchConfig,
    /// Line-item resolution rules
    pub catalog: FieldCatalog,
    /// Universe cleaning
    pub clean: CleanConfig,
    /// Train/test split
    pub split: SplitConfig,
    /// Table schema inference
    pub schema: SchemaConfig,
    /// Median imputation
    pub impute: ImputeConfig,
    /// Quarter-over-quarter growth
    pub qoq: QoqConfig,
    /// PCA and K-Means
    pub extraction: ExtractionConfig,
    /// Largest cluster count in the elbow diagnostic
    pub elbow_max_clusters: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            catalog: FieldCatalog::default(),
            clean: CleanConfig::default(),
            split: SplitConfig::default(),
            schema: SchemaConfig::default(),
            impute: ImputeConfig::default(),
            qoq: QoqConfig::default(),
            extraction: ExtractionConfig::default(),
            elbow_max_clusters: 10,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns IO or JSON errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the configuration as pretty JSON.
    ///
    /// # Errors
    /// Returns IO or JSON errors.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Derive KPI and growth columns for an imputed table.
///
/// Returns the widened table and the schema including the KPI metrics.
///
/// # Errors
/// Propagates schema and polars errors.
pub fn engineer_features(
    df: &DataFrame,
    schema: &SchemaConfig,
    qoq: &QoqConfig,
) -> Result<(DataFrame, TableSchema)> {
    let base = TableSchema::from_frame(df, schema)?;
    let (with_kpis, schema) = KpiEngine::default().derive(df, &base)?;
    let out = GrowthEngine::new(qoq.clone()).compute(&with_kpis, &schema)?;
    tracing::info!(
        rows = out.height(),
        columns = out.width(),
        metrics = schema.metric_count(),
        "Engineered features"
    );
    Ok((out, schema))
}

/// Summary of a fitted extraction over `augmented`, the table it was fitted
/// on with the cluster column appended.
///
/// # Errors
/// Returns [`FundamentaError::MissingColumn`] when the cluster column is
/// absent.
pub fn summarize(fitted: &FittedExtraction, augmented: &DataFrame) -> Result<RunSummary> {
    let labels: Vec<u32> = augmented
        .column(CLUSTER_COLUMN)
        .map_err(|_| FundamentaError::MissingColumn(CLUSTER_COLUMN.to_string()))?
        .cast(&DataType::UInt32)?
        .u32()?
        .into_iter()
        .flatten()
        .collect();
    let kmeans = fitted.kmeans();
    let sizes = cluster_sizes(&labels, kmeans.n_clusters());

    Ok(RunSummary::new(
        augmented.height(),
        projection_summary(PCA_ALL, fitted.pca_all()),
        projection_summary(PCA_KPI, fitted.pca_kpi()),
        sizes.to_vec(),
        kmeans.inertia(),
    ))
}

fn projection_summary(name: &str, artifact: &PcaArtifact) -> ProjectionSummary {
    ProjectionSummary::new(
        name,
        artifact.preprocessor().columns().len(),
        artifact.pca().explained_variance_ratio().to_vec(),
    )
}

/// Tables and transforms produced by [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Training table with features, projections and clusters
    pub train: DataFrame,
    /// Test table augmented with the training transforms
    pub test: DataFrame,
    /// Transforms fitted on the training table
    pub fitted: FittedExtraction,
    /// Summary of the fit
    pub summary: RunSummary,
}

/// Feature pipeline driven by a [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with the given configuration.
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn imputer(&self) -> Imputer {
        Imputer::new(self.config.impute.clone())
    }

    /// Impute the training table from its own medians and derive features.
    ///
    /// # Errors
    /// Propagates imputation and feature errors.
    pub fn prepare_train(&self, train: &DataFrame) -> Result<DataFrame> {
        let imputed = self.imputer().self_fill(train)?;
        let (features, _) = engineer_features(&imputed, &self.config.schema, &self.config.qoq)?;
        Ok(features)
    }

    /// Impute the test table from the raw training table's medians and
    /// derive features.
    ///
    /// # Errors
    /// Propagates imputation and feature errors.
    pub fn prepare_test(&self, test: &DataFrame, train: &DataFrame) -> Result<DataFrame> {
        let imputed = self.imputer().reference_fill(test, train)?;
        let (features, _) = engineer_features(&imputed, &self.config.schema, &self.config.qoq)?;
        Ok(features)
    }

    /// Fit the extraction transforms on a feature table.
    ///
    /// # Errors
    /// Propagates reduction errors.
    pub fn extract(&self, features: &DataFrame) -> Result<(FittedExtraction, DataFrame)> {
        Ok(FeatureExtractor::new(self.config.extraction.clone()).fit(features)?)
    }

    /// WGSS of K-Means on the KPI projection for `k = 1..=elbow_max_clusters`.
    ///
    /// # Errors
    /// Propagates reduction errors.
    pub fn elbow(&self, features: &DataFrame) -> Result<Vec<(usize, f64)>> {
        Ok(FeatureExtractor::new(self.config.extraction.clone())
            .elbow(features, self.config.elbow_max_clusters)?)
    }

    /// Run every feature stage on raw train and test tables.
    ///
    /// # Errors
    /// Propagates errors from any stage.
    pub fn run(&self, train: &DataFrame, test: &DataFrame) -> Result<PipelineOutput> {
        let train_features = self.prepare_train(train)?;
        let test_features = self.prepare_test(test, train)?;

        let (fitted, train_out) = self.extract(&train_features)?;
        let test_out = fitted.apply(&test_features)?;
        let summary = summarize(&fitted, &train_out)?;
        tracing::info!(
            train = train_out.height(),
            test = test_out.height(),
            clusters = summary.n_clusters(),
            "Pipeline complete"
        );

        Ok(PipelineOutput {
            train: train_out,
            test: test_out,
            fitted,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "split": { "test_size": 0.25 }, "extraction": { "kmeans": { "n_clusters": 4 } } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.split.test_size, 0.25);
        assert_eq!(config.split.seed, 6);
        assert_eq!(config.extraction.kmeans.n_clusters, 4);
        assert_eq!(config.extraction.kmeans.n_init, 100);
        assert_eq!(config.elbow_max_clusters, 10);
        assert_eq!(config.clean.exchanges.len(), 2);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut config = PipelineConfig::default();
        config.split.target = Some("_2025Q2".to_string());
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.split.target.as_deref(), Some("_2025Q2"));
        assert_eq!(loaded.catalog.fields.len(), config.catalog.fields.len());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            PipelineConfig::load("/nonexistent/pipeline.json"),
            Err(FundamentaError::Io(_))
        ));
    }
}
