//! Caching layer for resolved fundamentals.

pub mod sqlite;

pub use sqlite::{CacheStats, StatementCache};
