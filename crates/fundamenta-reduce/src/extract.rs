//! Feature extraction: `pca_all`, `pca_KPI` and `kmeans` fitted together.
//!
//! Fitting happens once on the training table. The fitted transforms are
//! immutable afterwards and are replayed on any other table with the same
//! feature columns, appending `PCA_all_PC{i}`, `PCA_KPI_PC{i}` and `Cluster`.

use crate::artifact::{ArtifactStore, KMEANS, PCA_ALL, PCA_KPI};
use crate::error::Result;
use crate::kmeans::{FittedKMeans, KMeansConfig, wgss_curve};
use crate::pca::{FittedPca, PcaConfig};
use crate::preprocess::{ColumnSelection, FittedPreprocessor, PreprocessConfig};
use ndarray::{Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Name of the appended cluster-label column.
pub const CLUSTER_COLUMN: &str = "Cluster";

/// Configuration for feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Preprocessing shared by both projections
    pub preprocess: PreprocessConfig,
    /// PCA over all numeric features (default: 50 components)
    pub pca_all: PcaConfig,
    /// PCA over KPI levels (default: 10 components)
    pub pca_kpi: PcaConfig,
    /// K-Means on the KPI projection
    pub kmeans: KMeansConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            pca_all: PcaConfig::with_components(50),
            pca_kpi: PcaConfig::with_components(10),
            kmeans: KMeansConfig::default(),
        }
    }
}

/// Preprocessing and PCA fitted as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaArtifact {
    preprocessor: FittedPreprocessor,
    pca: FittedPca,
}

impl PcaArtifact {
    fn fit(
        preprocess: &PreprocessConfig,
        pca: &PcaConfig,
        df: &DataFrame,
        selection: ColumnSelection,
    ) -> Result<(Self, Array2<f64>)> {
        let (preprocessor, scaled) = preprocess.fit(df, selection)?;
        let pca = pca.fit(&scaled)?;
        let scores = pca.transform(&scaled)?;
        Ok((Self { preprocessor, pca }, scores))
    }

    /// Preprocess and project `df`.
    ///
    /// # Errors
    /// Fails on dimension mismatch, missing columns or non-finite input.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let scaled = self.preprocessor.transform(df)?;
        self.pca.transform(&scaled)
    }

    /// Fitted preprocessing.
    pub const fn preprocessor(&self) -> &FittedPreprocessor {
        &self.preprocessor
    }

    /// Fitted projection.
    pub const fn pca(&self) -> &FittedPca {
        &self.pca
    }
}

/// The three fitted transforms of a feature-extraction run.
#[derive(Debug, Clone)]
pub struct FittedExtraction {
    pca_all: PcaArtifact,
    pca_kpi: PcaArtifact,
    kmeans: FittedKMeans,
}

impl FittedExtraction {
    /// PCA over all features.
    pub const fn pca_all(&self) -> &PcaArtifact {
        &self.pca_all
    }

    /// PCA over KPI levels.
    pub const fn pca_kpi(&self) -> &PcaArtifact {
        &self.pca_kpi
    }

    /// Clustering of the KPI projection.
    pub const fn kmeans(&self) -> &FittedKMeans {
        &self.kmeans
    }

    /// Append projections and cluster labels to `df` without refitting.
    ///
    /// # Errors
    /// Fails when `df` does not match the fitted feature columns.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let all = self.pca_all.transform(df)?;
        let kpi = self.pca_kpi.transform(df)?;
        let labels = self.kmeans.predict(&kpi)?;
        augment(df, &all, &kpi, labels)
    }

    /// Persist all three transforms under their logical names.
    ///
    /// # Errors
    /// Returns IO or JSON errors.
    pub fn save(&self, store: &ArtifactStore) -> Result<()> {
        store.save(PCA_ALL, &self.pca_all)?;
        store.save(PCA_KPI, &self.pca_kpi)?;
        store.save(KMEANS, &self.kmeans)?;
        tracing::info!(dir = %store.dir().display(), "saved extraction artifacts");
        Ok(())
    }

    /// Load previously saved transforms.
    ///
    /// # Errors
    /// Returns [`crate::ReduceError::ArtifactNotFound`] when any of them is missing.
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        Ok(Self {
            pca_all: store.load(PCA_ALL)?,
            pca_kpi: store.load(PCA_KPI)?,
            kmeans: store.load(KMEANS)?,
        })
    }
}

/// Fits the extraction transforms on a training table.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractionConfig,
}

impl FeatureExtractor {
    /// Create an extractor with the given configuration.
    pub const fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Fit all transforms on `df` and return them with the augmented table.
    ///
    /// # Errors
    /// Fails on empty feature sets, non-finite input or component and
    /// cluster counts the table cannot support.
    pub fn fit(&self, df: &DataFrame) -> Result<(FittedExtraction, DataFrame)> {
        let config = &self.config;
        let (pca_all, all) =
            PcaArtifact::fit(&config.preprocess, &config.pca_all, df, ColumnSelection::All)?;
        let (pca_kpi, kpi) =
            PcaArtifact::fit(&config.preprocess, &config.pca_kpi, df, ColumnSelection::Kpi)?;
        let kmeans = config.kmeans.fit(&kpi)?;
        let labels = kmeans.predict(&kpi)?;

        let augmented = augment(df, &all, &kpi, labels)?;
        Ok((
            FittedExtraction {
                pca_all,
                pca_kpi,
                kmeans,
            },
            augmented,
        ))
    }

    /// Elbow diagnostic: WGSS of K-Means on the KPI projection for
    /// `k = 1..=max_clusters`.
    ///
    /// # Errors
    /// Same conditions as [`Self::fit`].
    pub fn elbow(&self, df: &DataFrame, max_clusters: usize) -> Result<Vec<(usize, f64)>> {
        let config = &self.config;
        let (_, kpi) =
            PcaArtifact::fit(&config.preprocess, &config.pca_kpi, df, ColumnSelection::Kpi)?;
        wgss_curve(&kpi, max_clusters, &config.kmeans)
    }
}

fn score_columns(prefix: &str, scores: &Array2<f64>) -> Vec<Column> {
    scores
        .axis_iter(Axis(1))
        .enumerate()
        .map(|(i, values)| Column::new(format!("{prefix}{}", i + 1).into(), values.to_vec()))
        .collect()
}

fn augment(
    df: &DataFrame,
    all: &Array2<f64>,
    kpi: &Array2<f64>,
    labels: Vec<u32>,
) -> Result<DataFrame> {
    let mut columns = score_columns("PCA_all_PC", all);
    columns.extend(score_columns("PCA_KPI_PC", kpi));
    columns.push(Column::new(CLUSTER_COLUMN.into(), labels));
    // outputs of an earlier fit are overwritten in place
    let mut out = df.clone();
    for column in columns {
        out.with_column(column)?;
    }
    Ok(out)
}
