//! Universe preparation ahead of feature engineering.
//!
//! Cleaning restricts a vendor universe table, market-cap categories feed
//! both imputation strata and the split, and the stratified split produces
//! the train and test tables.

pub mod clean;
pub mod market_cap;
pub mod split;

pub use clean::{CleanConfig, clean_universe};
pub use market_cap::{
    MARKET_CAP_COLUMN, MARKET_VALUE_COLUMN, MarketCapCategory, assign_market_cap,
    parse_market_value,
};
pub use split::{SplitConfig, SplitTables, stratified_split};
