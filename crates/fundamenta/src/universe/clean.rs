//! Universe cleaning.
//!
//! Restricts a vendor universe table to uniquely identified US-listed
//! equities with usable fundamentals.

use std::collections::{HashMap, HashSet};

use fundamenta_features::QuarterLabel;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::market_cap::{MARKET_CAP_COLUMN, MARKET_VALUE_COLUMN, assign_market_cap};
use crate::error::{FundamentaError, Result};

/// Configuration for [`clean_universe`].
///
/// Optional vendor columns (`Asset Class`, `Exchange`, `Location`,
/// `Market Value`) are skipped when absent from the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Entity identity column
    pub id_column: String,
    /// Column holding the asset class
    pub asset_class_column: String,
    /// Asset class that is kept
    pub asset_class: String,
    /// Column holding the listing exchange
    pub exchange_column: String,
    /// Exchanges that are kept
    pub exchanges: Vec<String>,
    /// Base metrics that must be non-zero in every quarter
    pub nonzero_metrics: Vec<String>,
    /// Base metrics whose quarter columns are removed
    pub drop_metrics: Vec<String>,
    /// Vendor helper columns removed after filtering
    pub drop_columns: Vec<String>,
    /// Column holding the headquarters location
    pub location_column: String,
    /// Location encoded as 1; everything else is 0
    pub home_location: String,
    /// Column holding the vendor market value (thousands of dollars)
    pub market_value_column: String,
    /// Column receiving the market-cap category
    pub market_cap_column: String,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            id_column: "Ticker".to_string(),
            asset_class_column: "Asset Class".to_string(),
            asset_class: "Equity".to_string(),
            exchange_column: "Exchange".to_string(),
            exchanges: vec![
                "NASDAQ".to_string(),
                "New York Stock Exchange Inc.".to_string(),
            ],
            nonzero_metrics: ["Revenue", "TotalAssets", "TotalEquity", "CurrentLiabilities"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            drop_metrics: vec!["ShortTermDebtOrCurrentLiab".to_string()],
            drop_columns: ["OriginalTicker", "YahooSymbol", "Asset Class", "Currency"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            location_column: "Location".to_string(),
            home_location: "United States".to_string(),
            market_value_column: MARKET_VALUE_COLUMN.to_string(),
            market_cap_column: MARKET_CAP_COLUMN.to_string(),
        }
    }
}

/// Clean a universe table.
///
/// Steps, in order: drop exact duplicate rows, drop every row of a ticker
/// that still appears more than once, keep the configured asset class and
/// exchanges, drop rows with a zero in any non-zero metric for any quarter,
/// drop configured metric and helper columns, encode the location flag and
/// assign market-cap categories.
///
/// # Errors
/// Returns [`FundamentaError::MissingColumn`] when the identity column is
/// absent.
pub fn clean_universe(df: &DataFrame, config: &CleanConfig) -> Result<DataFrame> {
    if df.column(&config.id_column).is_err() {
        return Err(FundamentaError::MissingColumn(config.id_column.clone()));
    }
    let initial = df.height();

    let distinct = df.filter(&distinct_row_mask(df)?)?;
    let unique = distinct.filter(&unique_id_mask(&distinct, &config.id_column)?)?;
    tracing::info!(
        duplicates = initial - distinct.height(),
        duplicated_ids = distinct.height() - unique.height(),
        "Removed duplicate rows"
    );

    let names: HashSet<String> = unique
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect();

    let mut lf = unique.lazy();
    if names.contains(&config.asset_class_column) {
        lf = lf.filter(col(config.asset_class_column.as_str()).eq(lit(config.asset_class.as_str())));
    }
    if names.contains(&config.exchange_column) && !config.exchanges.is_empty() {
        let listed = config
            .exchanges
            .iter()
            .fold(lit(false), |acc, exchange| {
                acc.or(col(config.exchange_column.as_str()).eq(lit(exchange.as_str())))
            });
        lf = lf.filter(listed.fill_null(lit(false)));
    }

    let zero_checked: Vec<&String> = names
        .iter()
        .filter(|name| has_base_metric(name, &config.nonzero_metrics))
        .collect();
    if !zero_checked.is_empty() {
        let nonzero = zero_checked.iter().fold(lit(true), |acc, name| {
            acc.and(
                col(name.as_str())
                    .cast(DataType::Float64)
                    .neq(lit(0.0))
                    .fill_null(lit(true)),
            )
        });
        lf = lf.filter(nonzero);
    }

    if names.contains(&config.location_column) {
        lf = lf.with_column(
            when(col(config.location_column.as_str()).eq(lit(config.home_location.as_str())))
                .then(lit(1i32))
                .otherwise(lit(0i32))
                .alias(config.location_column.as_str()),
        );
    }

    let mut out = lf.collect()?;
    tracing::info!(rows = out.height(), "Filtered universe");

    let removable: Vec<String> = out
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .filter(|name| {
            config.drop_columns.contains(name) || has_base_metric(name, &config.drop_metrics)
        })
        .collect();
    for name in &removable {
        out = out.drop(name)?;
    }
    tracing::debug!(columns = ?removable, "Dropped columns");

    if names.contains(&config.market_value_column) {
        out = assign_market_cap(&out, &config.market_value_column, &config.market_cap_column)?;
    }

    tracing::info!(
        rows = out.height(),
        columns = out.width(),
        dropped = initial - out.height(),
        "Cleaned universe"
    );
    Ok(out)
}

fn has_base_metric(name: &str, metrics: &[String]) -> bool {
    QuarterLabel::split_column(name).is_some_and(|(metric, _)| metrics.iter().any(|m| m == metric))
}

/// `true` for the first occurrence of every distinct row.
fn distinct_row_mask(df: &DataFrame) -> Result<BooleanChunked> {
    let mut keys = vec![String::new(); df.height()];
    for column in df.get_columns() {
        let text = column.cast(&DataType::String)?;
        for (key, value) in keys.iter_mut().zip(text.str()?.into_iter()) {
            key.push_str(value.unwrap_or("\u{0}"));
            key.push('\u{1f}');
        }
    }
    let mut seen = HashSet::with_capacity(keys.len());
    let mask: Vec<bool> = keys.into_iter().map(|key| seen.insert(key)).collect();
    Ok(BooleanChunked::from_slice("distinct".into(), &mask))
}

/// `true` for rows whose identifier occurs exactly once.
fn unique_id_mask(df: &DataFrame, id_column: &str) -> Result<BooleanChunked> {
    let ids = df.column(id_column)?.cast(&DataType::String)?;
    let ids = ids.str()?;
    let mut counts: HashMap<Option<&str>, usize> = HashMap::new();
    for id in ids.into_iter() {
        *counts.entry(id).or_default() += 1;
    }
    let mask: Vec<bool> = ids.into_iter().map(|id| counts[&id] == 1).collect();
    Ok(BooleanChunked::from_slice("unique".into(), &mask))
}
