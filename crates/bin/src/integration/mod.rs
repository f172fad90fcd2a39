//! Glue between the command line and the library stages.
//!
//! Retrieval with an on-disk cache and progress reporting lives here; the
//! feature stages are called directly from `main`.

pub(crate) mod cache_manager;
pub(crate) mod fetch_pipeline;
