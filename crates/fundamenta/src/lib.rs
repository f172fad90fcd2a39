#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fundamenta/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod pipeline;
pub mod universe;

// Re-export main types from sub-crates
pub use fundamenta_data as data;
pub use fundamenta_features as features;
pub use fundamenta_output as output;
pub use fundamenta_reduce as reduce;

pub use error::{FundamentaError, Result};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, engineer_features, summarize};
pub use universe::{
    CleanConfig, MarketCapCategory, SplitConfig, SplitTables, assign_market_cap, clean_universe,
    stratified_split,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
