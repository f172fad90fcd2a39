#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fundamenta/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod artifact;
pub mod error;
pub mod extract;
pub mod kmeans;
pub mod linalg;
pub mod pca;
pub mod preprocess;
pub mod scale;

pub use artifact::{ArtifactStore, KMEANS, PCA_ALL, PCA_KPI};
pub use error::{ReduceError, Result};
pub use extract::{
    CLUSTER_COLUMN, ExtractionConfig, FeatureExtractor, FittedExtraction, PcaArtifact,
};
pub use kmeans::{FittedKMeans, KMeansConfig, cluster_sizes, wgss_curve};
pub use pca::{FittedPca, PcaConfig};
pub use preprocess::{ColumnSelection, FittedPreprocessor, PreprocessConfig};
pub use scale::{FittedScaler, ScalerKind};
