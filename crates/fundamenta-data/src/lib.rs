#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fundamenta/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod calendar;
pub mod error;
pub mod macroeconomic;
pub mod source;
pub mod table;

pub use cache::{CacheStats, StatementCache};
pub use calendar::{last_completed_quarter, last_n_completed_quarters, quarter_of};
pub use error::{DataError, Result};
pub use macroeconomic::{
    DEFAULT_MACRO_SERIES, FredClient, MacroSeries, broadcast_macro, macro_row, quarterly_means,
};
pub use source::{
    FetchConfig, FieldCatalog, FieldResolver, FieldSpec, JsonStatementSource, RawStatements,
    Statement, StatementSource, TICKER_COLUMN, TickerFundamentals, YahooStatementSource,
    fetch_fundamentals_batch, fetch_ticker, fundamentals_frame, merge_fundamentals,
    universe_tickers,
};
pub use table::{read_table, write_table};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
