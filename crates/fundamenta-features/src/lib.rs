#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fundamenta/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod growth;
pub mod impute;
pub mod kpi;
pub mod quarter;
pub mod schema;

pub use error::{FeatureError, Result};
pub use growth::{GrowthEngine, QoqConfig, qoq_change, safe_slope};
pub use impute::{ImputeConfig, Imputer};
pub use kpi::{Kpi, KpiEngine, KpiInfo, KpiKind, available_kpis, get_kpi_info};
pub use quarter::QuarterLabel;
pub use schema::{SchemaConfig, TableSchema, infer_metrics, infer_quarters};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
