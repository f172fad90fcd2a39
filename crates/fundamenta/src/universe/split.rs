//! Stratified train/test split.

use std::collections::BTreeMap;

use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{FundamentaError, Result};

/// Configuration for [`stratified_split`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of every stratum assigned to the test set
    pub test_size: f64,
    /// RNG seed for the per-stratum shuffle
    pub seed: u64,
    /// Entity identity column, kept in all four outputs
    pub id_column: String,
    /// Market-cap category column
    pub market_cap_column: String,
    /// Sector column
    pub sector_column: String,
    /// Columns whose name contains this string are targets (e.g. `_2025Q2`)
    pub target: Option<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 6,
            id_column: "Ticker".to_string(),
            market_cap_column: "Market Cap".to_string(),
            sector_column: "Sector".to_string(),
            target: None,
        }
    }
}

/// Output of [`stratified_split`].
#[derive(Debug, Clone)]
pub struct SplitTables {
    /// Training features
    pub x_train: DataFrame,
    /// Test features
    pub x_test: DataFrame,
    /// Training targets (identity column plus target columns)
    pub y_train: DataFrame,
    /// Test targets (identity column plus target columns)
    pub y_test: DataFrame,
}

/// Split `df` into disjoint train and test sets stratified by market cap and
/// sector.
///
/// Strata with fewer than two members are removed. Every remaining stratum
/// contributes at least one row to each side. Rows keep their input order
/// within each output table.
///
/// # Errors
/// Returns [`FundamentaError::InvalidParameter`] when `test_size` is outside
/// `(0, 1)` and [`FundamentaError::MissingColumn`] when a stratum column is
/// absent.
pub fn stratified_split(df: &DataFrame, config: &SplitConfig) -> Result<SplitTables> {
    if !(config.test_size > 0.0 && config.test_size < 1.0) {
        return Err(FundamentaError::InvalidParameter(format!(
            "test_size must be in (0, 1), got {}",
            config.test_size
        )));
    }

    let strata = strata_keys(df, config)?;
    let mut groups: BTreeMap<String, Vec<IdxSize>> = BTreeMap::new();
    for (row, key) in strata.into_iter().enumerate() {
        groups.entry(key).or_default().push(row as IdxSize);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    let mut removed = 0usize;
    for rows in groups.values_mut() {
        if rows.len() < 2 {
            removed += rows.len();
            continue;
        }
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64) * config.test_size)
            .round()
            .clamp(1.0, (rows.len() - 1) as f64) as usize;
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    if train.is_empty() {
        return Err(FundamentaError::InvalidParameter(
            "no stratum has at least two members".to_string(),
        ));
    }
    train.sort_unstable();
    test.sort_unstable();
    tracing::info!(
        train = train.len(),
        test = test.len(),
        removed,
        strata = groups.len(),
        "Stratified split"
    );

    let (x_columns, y_columns) = feature_target_columns(df, config);
    let train_rows = df.take(&IdxCa::from_vec("train".into(), train))?;
    let test_rows = df.take(&IdxCa::from_vec("test".into(), test))?;

    Ok(SplitTables {
        x_train: train_rows.select(x_columns.iter().map(String::as_str))?,
        x_test: test_rows.select(x_columns.iter().map(String::as_str))?,
        y_train: train_rows.select(y_columns.iter().map(String::as_str))?,
        y_test: test_rows.select(y_columns.iter().map(String::as_str))?,
    })
}

/// Feature and target column names; the identity column leads both lists.
fn feature_target_columns(df: &DataFrame, config: &SplitConfig) -> (Vec<String>, Vec<String>) {
    let mut x = Vec::new();
    let mut y = Vec::new();
    let has_id = df.column(&config.id_column).is_ok();
    if has_id {
        x.push(config.id_column.clone());
        y.push(config.id_column.clone());
    }
    for name in df.get_column_names() {
        if name.as_str() == config.id_column {
            continue;
        }
        let is_target = config
            .target
            .as_deref()
            .is_some_and(|target| name.contains(target));
        if is_target {
            y.push(name.to_string());
        } else {
            x.push(name.to_string());
        }
    }
    (x, y)
}

fn strata_keys(df: &DataFrame, config: &SplitConfig) -> Result<Vec<String>> {
    let text = |name: &str| -> Result<Vec<String>> {
        let column = df
            .column(name)
            .map_err(|_| FundamentaError::MissingColumn(name.to_string()))?
            .cast(&DataType::String)?;
        Ok(column
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or("null").to_string())
            .collect())
    };
    let caps = text(&config.market_cap_column)?;
    let sectors = text(&config.sector_column)?;
    Ok(caps
        .into_iter()
        .zip(sectors)
        .map(|(cap, sector)| format!("{cap}_{sector}"))
        .collect())
}
