//! Quarterly fundamentals retrieval.
//!
//! A [`StatementSource`] returns raw statement rows for one ticker; the
//! [`FieldResolver`] maps them onto canonical metrics and quarters; and
//! [`fetch_fundamentals_batch`] runs many tickers with bounded concurrency
//! and retry. A ticker that never resolves still produces a row, carrying
//! only its identifier.

pub mod catalog;
pub mod json;
pub mod resolve;
pub mod yahoo;

pub use catalog::{FieldCatalog, FieldSpec, Statement};
pub use json::JsonStatementSource;
pub use resolve::{FieldResolver, QuarterValues, find_line, normalize_label};
pub use yahoo::YahooStatementSource;

use crate::calendar::last_n_completed_quarters;
use crate::error::Result;
use chrono::{Local, NaiveDate};
use fundamenta_features::QuarterLabel;
use futures::stream::{self, StreamExt};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Identifier column of the fundamentals table.
pub const TICKER_COLUMN: &str = "Ticker";

/// Rows of one statement: vendor label to `(period end, value)` points.
pub type LineItems = BTreeMap<String, Vec<(NaiveDate, f64)>>;

/// The three quarterly statements of one company, as reported by a vendor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatements {
    /// Income statement rows
    #[serde(default)]
    pub income: LineItems,
    /// Balance sheet rows
    #[serde(default)]
    pub balance_sheet: LineItems,
    /// Cash-flow statement rows
    #[serde(default)]
    pub cash_flow: LineItems,
}

impl RawStatements {
    /// Rows of one statement.
    pub const fn statement(&self, statement: Statement) -> &LineItems {
        match statement {
            Statement::Income => &self.income,
            Statement::BalanceSheet => &self.balance_sheet,
            Statement::CashFlow => &self.cash_flow,
        }
    }

    /// Mutable rows of one statement.
    pub const fn statement_mut(&mut self, statement: Statement) -> &mut LineItems {
        match statement {
            Statement::Income => &mut self.income,
            Statement::BalanceSheet => &mut self.balance_sheet,
            Statement::CashFlow => &mut self.cash_flow,
        }
    }

    /// True when no statement has any row.
    pub fn is_empty(&self) -> bool {
        self.income.is_empty() && self.balance_sheet.is_empty() && self.cash_flow.is_empty()
    }
}

/// A provider of raw quarterly statements.
pub trait StatementSource {
    /// Fetch the statements reported for `ticker`.
    fn fetch_statements(&self, ticker: &str) -> impl Future<Output = Result<RawStatements>> + Send;
}

/// Resolved fundamentals of one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerFundamentals {
    /// Ticker as given in the universe
    pub ticker: String,
    /// `(metric, quarter) -> value`; absent means missing, never zero
    pub values: QuarterValues,
}

impl TickerFundamentals {
    /// A row carrying only the identifier.
    pub fn empty(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            values: QuarterValues::new(),
        }
    }

    /// Value of `metric` in `quarter`.
    pub fn get(&self, metric: &str, quarter: QuarterLabel) -> Option<f64> {
        self.values.get(&(metric.to_string(), quarter)).copied()
    }

    /// True when nothing resolved.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Concurrent requests in flight (default: 8)
    pub concurrency: usize,
    /// Retries after the first failed attempt (default: 2)
    pub retries: usize,
    /// Pause before the first retry in milliseconds, doubled each retry (default: 300)
    pub pause_ms: u64,
    /// Completed quarters kept per ticker (default: 5)
    pub n_quarters: usize,
    /// Reference date for "completed" quarters (default: today)
    pub as_of: Option<NaiveDate>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retries: 2,
            pause_ms: 300,
            n_quarters: 5,
            as_of: None,
        }
    }
}

impl FetchConfig {
    /// Retained quarters, oldest first.
    ///
    /// # Errors
    /// Fails only for dates outside the representable year range.
    pub fn quarters(&self) -> Result<Vec<QuarterLabel>> {
        let as_of = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        let mut quarters = last_n_completed_quarters(self.n_quarters, as_of)?;
        quarters.reverse();
        Ok(quarters)
    }
}

/// Unique, trimmed, non-empty tickers of a universe table in first-seen order.
///
/// # Errors
/// Fails when `column` is missing or not a string column.
pub fn universe_tickers(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let tickers = df
        .column(column)
        .map_err(|_| crate::error::DataError::MissingColumn(column.to_string()))?
        .str()?;
    let mut seen = BTreeSet::new();
    Ok(tickers
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|t| !t.is_empty() && seen.insert(t.to_string()))
        .map(str::to_string)
        .collect())
}

/// Fetch and resolve one ticker, retrying with exponential backoff.
///
/// Exhausted retries yield [`TickerFundamentals::empty`].
pub async fn fetch_ticker<S: StatementSource>(
    source: &S,
    ticker: &str,
    resolver: &FieldResolver,
    config: &FetchConfig,
) -> TickerFundamentals {
    let mut pause = Duration::from_millis(config.pause_ms);
    for attempt in 0..=config.retries {
        let resolved = match source.fetch_statements(ticker).await {
            Ok(statements) => resolver.resolve(&statements),
            Err(e) => Err(e),
        };
        match resolved {
            Ok(values) => {
                return TickerFundamentals {
                    ticker: ticker.to_string(),
                    values,
                };
            }
            Err(e) => {
                tracing::warn!(ticker, attempt, error = %e, "fetch failed");
                if attempt < config.retries {
                    sleep(pause).await;
                    pause *= 2;
                }
            }
        }
    }
    TickerFundamentals::empty(ticker)
}

/// Fetch many tickers with at most `config.concurrency` requests in flight.
///
/// `on_complete` sees each row as it finishes; the returned rows follow the
/// order of `tickers`.
pub async fn fetch_fundamentals_batch<S, F>(
    source: &S,
    tickers: &[String],
    resolver: &FieldResolver,
    config: &FetchConfig,
    mut on_complete: F,
) -> Vec<TickerFundamentals>
where
    S: StatementSource + Sync,
    F: FnMut(&TickerFundamentals),
{
    let mut rows: Vec<(usize, TickerFundamentals)> = Vec::with_capacity(tickers.len());
    let mut completed = stream::iter(tickers.iter().enumerate())
        .map(|(i, ticker)| async move { (i, fetch_ticker(source, ticker, resolver, config).await) })
        .buffer_unordered(config.concurrency.max(1));

    while let Some((i, row)) = completed.next().await {
        on_complete(&row);
        rows.push((i, row));
    }

    rows.sort_by_key(|(i, _)| *i);
    let rows: Vec<TickerFundamentals> = rows.into_iter().map(|(_, row)| row).collect();
    tracing::info!(
        tickers = rows.len(),
        unresolved = rows.iter().filter(|r| r.is_empty()).count(),
        "fundamentals fetched"
    );
    rows
}

/// Wide fundamentals table: `Ticker` then `{metric}_{quarter}` columns.
///
/// Metrics follow catalog order and quarters run oldest first. A column is
/// emitted only when at least one ticker has a value for it; absent values
/// are null.
///
/// # Errors
/// Returns polars errors from frame construction.
pub fn fundamentals_frame(
    rows: &[TickerFundamentals],
    catalog: &FieldCatalog,
    quarters: &[QuarterLabel],
) -> Result<DataFrame> {
    let mut sorted: Vec<QuarterLabel> = quarters.to_vec();
    sorted.sort();
    sorted.dedup();

    let present: BTreeSet<&(String, QuarterLabel)> =
        rows.iter().flat_map(|r| r.values.keys()).collect();

    let mut columns = vec![Column::new(
        TICKER_COLUMN.into(),
        rows.iter().map(|r| r.ticker.clone()).collect::<Vec<String>>(),
    )];
    for metric in catalog.metrics() {
        for quarter in &sorted {
            let key = (metric.to_string(), *quarter);
            if !present.contains(&key) {
                continue;
            }
            let values: Vec<Option<f64>> = rows.iter().map(|r| r.values.get(&key).copied()).collect();
            columns.push(Column::new(quarter.column(metric).into(), values));
        }
    }
    Ok(DataFrame::new(columns)?)
}

/// Left-join fundamentals onto a universe table by `key`.
///
/// Universe columns that the fundamentals table also carries are replaced;
/// universe row order is preserved.
///
/// # Errors
/// Fails when `key` is missing from either table.
pub fn merge_fundamentals(universe: &DataFrame, fundamentals: &DataFrame, key: &str) -> Result<DataFrame> {
    for df in [universe, fundamentals] {
        if df.column(key).is_err() {
            return Err(crate::error::DataError::MissingColumn(key.to_string()));
        }
    }
    const ROW_INDEX: &str = "__row_index";

    let replaced: Vec<PlSmallStr> = fundamentals
        .get_column_names()
        .into_iter()
        .filter(|c| c.as_str() != key && universe.column(c.as_str()).is_ok())
        .cloned()
        .collect();
    let base = universe.drop_many(replaced);

    let merged = base
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(
            fundamentals.clone().lazy(),
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Left),
        )
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?
        .drop(ROW_INDEX)?;
    tracing::info!(rows = merged.height(), columns = merged.width(), "merged fundamentals");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn q(raw: &str) -> QuarterLabel {
        raw.parse().unwrap()
    }

    fn row(ticker: &str, values: &[(&str, &str, f64)]) -> TickerFundamentals {
        TickerFundamentals {
            ticker: ticker.to_string(),
            values: values
                .iter()
                .map(|(m, quarter, v)| (((*m).to_string(), q(quarter)), *v))
                .collect(),
        }
    }

    #[test]
    fn test_fetch_config_quarters_oldest_first() {
        let config = FetchConfig {
            n_quarters: 3,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 15),
            ..FetchConfig::default()
        };
        let labels: Vec<String> = config.quarters().unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["2024Q2", "2024Q3", "2024Q4"]);
    }

    #[test]
    fn test_fundamentals_frame_layout() {
        let rows = vec![
            row("AAA", &[("Revenue", "2024Q2", 10.0), ("Revenue", "2024Q1", 8.0)]),
            TickerFundamentals::empty("BBB"),
        ];
        let df = fundamentals_frame(&rows, &FieldCatalog::default(), &[q("2024Q2"), q("2024Q1")]).unwrap();

        let names: Vec<&str> = df.get_column_names().into_iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["Ticker", "Revenue_2024Q1", "Revenue_2024Q2"]);
        let revenue = df.column("Revenue_2024Q2").unwrap().f64().unwrap();
        assert_relative_eq!(revenue.get(0).unwrap(), 10.0);
        assert!(revenue.get(1).is_none());
    }

    #[test]
    fn test_merge_keeps_universe_order_and_replaces_columns() {
        let universe = df!(
            "Ticker" => ["BBB", "AAA", "CCC"],
            "Sector" => ["Energy", "Tech", "Tech"],
            "Revenue_2024Q1" => [1.0, 1.0, 1.0]
        )
        .unwrap();
        let fundamentals = df!(
            "Ticker" => ["AAA", "BBB"],
            "Revenue_2024Q1" => [5.0, 7.0]
        )
        .unwrap();

        let merged = merge_fundamentals(&universe, &fundamentals, "Ticker").unwrap();
        assert_eq!(merged.height(), 3);
        assert_eq!(merged.width(), 3);
        let tickers: Vec<Option<&str>> = merged.column("Ticker").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(tickers, vec![Some("BBB"), Some("AAA"), Some("CCC")]);
        let revenue = merged.column("Revenue_2024Q1").unwrap().f64().unwrap();
        assert_eq!(revenue.get(0), Some(7.0));
        assert_eq!(revenue.get(2), None);
    }

    #[test]
    fn test_universe_tickers_unique_and_trimmed() {
        let df = df!("Ticker" => [Some(" AAA"), Some("BBB"), None, Some("AAA "), Some("")]).unwrap();
        assert_eq!(universe_tickers(&df, "Ticker").unwrap(), vec!["AAA", "BBB"]);
        assert!(universe_tickers(&df, "Symbol").is_err());
    }

    #[test]
    fn test_merge_requires_key() {
        let universe = df!("Symbol" => ["AAA"]).unwrap();
        let fundamentals = df!("Ticker" => ["AAA"]).unwrap();
        assert!(merge_fundamentals(&universe, &fundamentals, "Ticker").is_err());
    }
}
