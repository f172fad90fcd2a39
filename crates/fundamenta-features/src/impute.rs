//! Group-wise median imputation.
//!
//! Missing fundamentals are filled with the median of the same column inside
//! the row's (sector, market-cap bucket) group. Self-fill computes medians
//! from the table being filled; reference-fill takes them from a separate
//! table (the training set) so held-out rows never leak into the medians.
//! Both variants finish with a completeness gate that drops rows still
//! missing any target value.

use crate::error::{FeatureError, Result};
use crate::quarter::QuarterLabel;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Fundamental line items that are imputed by default.
pub const DEFAULT_IMPUTE_PREFIXES: [&str; 18] = [
    "CapitalExpenditure",
    "CashAndSTInvestments",
    "CashFromOps",
    "CostOfRevenue",
    "CurrentAssets",
    "CurrentLiabilities",
    "EPS",
    "IncomeTaxExpense",
    "InterestExpense",
    "LongTermDebt",
    "NetIncome",
    "OperatingIncome",
    "OtherOperatingExpense",
    "Revenue",
    "TotalAssets",
    "TotalDebt",
    "TotalEquity",
    "TotalLiabilities",
];

const MEDIAN_SUFFIX: &str = "__group_median";
const KEY_PREFIX: &str = "__group_key_";
const ROW_INDEX: &str = "__row_index";

/// Configuration for the imputer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputeConfig {
    /// Columns defining a strata group (default: `Sector`, `Market Cap`)
    pub group_columns: Vec<String>,
    /// Base metrics whose quarter columns are imputed
    pub prefixes: Vec<String>,
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            group_columns: vec!["Sector".to_string(), "Market Cap".to_string()],
            prefixes: DEFAULT_IMPUTE_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl ImputeConfig {
    /// Quarter columns of `df` belonging to one of the configured prefixes,
    /// in table order.
    pub fn target_columns(&self, df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .into_iter()
            .filter(|name| {
                QuarterLabel::split_column(name.as_str())
                    .is_some_and(|(metric, _)| self.prefixes.iter().any(|p| p == metric))
            })
            .map(|name| name.to_string())
            .collect()
    }
}

/// Median imputer over strata groups.
#[derive(Debug, Clone, Default)]
pub struct Imputer {
    config: ImputeConfig,
}

impl Imputer {
    /// Create an imputer with the given configuration.
    pub const fn new(config: ImputeConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &ImputeConfig {
        &self.config
    }

    /// Fill missing target cells with medians computed from `df` itself,
    /// then drop rows still missing any target.
    ///
    /// # Errors
    /// Returns [`FeatureError::MissingColumn`] when a group column is absent.
    pub fn self_fill(&self, df: &DataFrame) -> Result<DataFrame> {
        self.check_group_columns(df)?;
        let targets = self.config.target_columns(df);
        let keys: Vec<Expr> = self
            .config
            .group_columns
            .iter()
            .map(|c| col(c.as_str()))
            .collect();

        let filled = df
            .clone()
            .lazy()
            .with_columns(normalize_missing(&targets))
            .with_columns(
                targets
                    .iter()
                    .map(|t| {
                        when(self.keys_present())
                            .then(
                                col(t.as_str())
                                    .fill_null(col(t.as_str()).median().over(keys.clone())),
                            )
                            .otherwise(col(t.as_str()))
                            .alias(t.as_str())
                    })
                    .collect::<Vec<_>>(),
            )
            .filter(complete(&targets))
            .collect()?;

        log_gate("self_fill", df.height(), filled.height(), targets.len());
        Ok(filled)
    }

    /// Fill missing target cells of `df` with medians computed only from
    /// `reference`, then drop rows still missing any target.
    ///
    /// Rows whose group does not occur in `reference` receive no fill.
    ///
    /// # Errors
    /// Returns [`FeatureError::MissingColumn`] when a group column is absent
    /// from either table.
    pub fn reference_fill(&self, df: &DataFrame, reference: &DataFrame) -> Result<DataFrame> {
        self.check_group_columns(df)?;
        let targets = self.config.target_columns(df);
        let medians = self.group_medians(reference, &targets)?;
        let original: Vec<Expr> = df
            .get_column_names()
            .into_iter()
            .map(|c| col(c.as_str()))
            .collect();
        let key_names: Vec<String> = self.key_names();
        let key_cols: Vec<Expr> = key_names.iter().map(|k| col(k.as_str())).collect();

        let filled = df
            .clone()
            .lazy()
            .with_row_index(ROW_INDEX, None)
            .with_columns(self.key_exprs())
            .with_columns(normalize_missing(&targets))
            .join(
                medians.lazy(),
                key_cols.clone(),
                key_cols,
                JoinArgs::new(JoinType::Left),
            )
            .with_columns(
                targets
                    .iter()
                    .map(|t| {
                        col(t.as_str())
                            .fill_null(col(format!("{t}{MEDIAN_SUFFIX}").as_str()))
                            .alias(t.as_str())
                    })
                    .collect::<Vec<_>>(),
            )
            .sort([ROW_INDEX], SortMultipleOptions::default())
            .filter(complete(&targets))
            .select(original)
            .collect()?;

        log_gate("reference_fill", df.height(), filled.height(), targets.len());
        Ok(filled)
    }

    /// Per-group medians of `targets` in `reference`.
    ///
    /// One row per group with non-null keys; key columns are named
    /// `__group_key_{column}` (cast to strings) and medians
    /// `{target}__group_median`.
    ///
    /// # Errors
    /// Returns [`FeatureError::MissingColumn`] when a group or target column
    /// is absent from `reference`.
    pub fn group_medians(&self, reference: &DataFrame, targets: &[String]) -> Result<DataFrame> {
        self.check_group_columns(reference)?;
        let available = reference.get_column_names();
        if let Some(missing) = targets
            .iter()
            .find(|t| !available.iter().any(|c| c.as_str() == t.as_str()))
        {
            return Err(FeatureError::MissingColumn(missing.clone()));
        }
        let key_cols: Vec<Expr> = self.key_names().iter().map(|k| col(k.as_str())).collect();

        let medians = reference
            .clone()
            .lazy()
            .with_columns(self.key_exprs())
            .filter(self.keys_present())
            .with_columns(normalize_missing(targets))
            .group_by_stable(key_cols)
            .agg(
                targets
                    .iter()
                    .map(|t| {
                        col(t.as_str())
                            .median()
                            .alias(format!("{t}{MEDIAN_SUFFIX}").as_str())
                    })
                    .collect::<Vec<_>>(),
            )
            .collect()?;

        tracing::debug!(groups = medians.height(), "computed reference medians");
        Ok(medians)
    }

    fn check_group_columns(&self, df: &DataFrame) -> Result<()> {
        let names = df.get_column_names();
        for group in &self.config.group_columns {
            if !names.iter().any(|c| c.as_str() == group.as_str()) {
                return Err(FeatureError::MissingColumn(group.clone()));
            }
        }
        Ok(())
    }

    fn key_names(&self) -> Vec<String> {
        self.config
            .group_columns
            .iter()
            .map(|c| format!("{KEY_PREFIX}{c}"))
            .collect()
    }

    fn key_exprs(&self) -> Vec<Expr> {
        self.config
            .group_columns
            .iter()
            .map(|c| {
                col(c.as_str())
                    .cast(DataType::String)
                    .alias(format!("{KEY_PREFIX}{c}").as_str())
            })
            .collect()
    }

    fn keys_present(&self) -> Expr {
        self.config
            .group_columns
            .iter()
            .fold(lit(true), |acc, c| acc.and(col(c.as_str()).is_not_null()))
    }
}

/// Cast targets to `f64` and treat NaN as missing.
fn normalize_missing(targets: &[String]) -> Vec<Expr> {
    targets
        .iter()
        .map(|t| {
            col(t.as_str())
                .cast(DataType::Float64)
                .fill_nan(lit(NULL))
                .alias(t.as_str())
        })
        .collect()
}

fn complete(targets: &[String]) -> Expr {
    targets
        .iter()
        .fold(lit(true), |acc, t| acc.and(col(t.as_str()).is_not_null()))
}

fn log_gate(stage: &str, before: usize, after: usize, targets: usize) {
    tracing::info!(
        stage,
        targets,
        rows = after,
        dropped = before.saturating_sub(after),
        "imputation complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> ImputeConfig {
        ImputeConfig {
            prefixes: vec!["Revenue".to_string(), "TotalAssets".to_string()],
            ..ImputeConfig::default()
        }
    }

    fn sample() -> DataFrame {
        df! {
            "Ticker" => &["A", "B", "C", "D", "E"],
            "Sector" => &["Tech", "Tech", "Tech", "Energy", "Energy"],
            "Market Cap" => &["Small-Cap", "Small-Cap", "Small-Cap", "Mid-Cap", "Mid-Cap"],
            "Revenue_2024Q1" => &[Some(10.0), Some(30.0), None, Some(5.0), None],
            "TotalAssets_2024Q1" => &[Some(1.0), Some(2.0), Some(3.0), None, None],
            "Revenue_QoQ_24Q1_24Q2" => &[None::<f64>, None, None, None, None],
        }
        .unwrap()
    }

    #[test]
    fn test_target_columns_skip_derived_columns() {
        let targets = config().target_columns(&sample());
        assert_eq!(targets, vec!["Revenue_2024Q1", "TotalAssets_2024Q1"]);
    }

    #[test]
    fn test_self_fill_uses_group_median() {
        let out = Imputer::new(config()).self_fill(&sample()).unwrap();
        // Energy has no TotalAssets at all, so both Energy rows are dropped.
        assert_eq!(out.height(), 3);
        let revenue = out.column("Revenue_2024Q1").unwrap().f64().unwrap();
        assert_relative_eq!(revenue.get(2).unwrap(), 20.0);
        assert_eq!(revenue.null_count(), 0);
    }

    #[test]
    fn test_missing_group_column_is_error() {
        let df = sample().drop("Sector").unwrap();
        let result = Imputer::new(config()).self_fill(&df);
        assert!(matches!(result, Err(FeatureError::MissingColumn(c)) if c == "Sector"));
    }

    #[test]
    fn test_group_medians_one_row_per_group() {
        let imputer = Imputer::new(config());
        let targets = vec!["Revenue_2024Q1".to_string()];
        let medians = imputer.group_medians(&sample(), &targets).unwrap();
        assert_eq!(medians.height(), 2);
    }
}
