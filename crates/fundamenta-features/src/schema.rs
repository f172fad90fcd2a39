//! Schema inference for wide fundamentals tables.
//!
//! Every time-varying column is named `{metric}_{YYYYQ#}`. The schema is
//! inferred once from those names and then handed to each stage, so later
//! stages never re-derive metrics by pattern matching on their own.

use crate::error::{FeatureError, Result};
use crate::quarter::QuarterLabel;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Prefix shared by all derived KPI metrics.
pub const KPI_PREFIX: &str = "KPI";

/// Configuration for schema inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Entity identity column (default: `Ticker`)
    pub id_column: String,
    /// Metric whose columns decide whether the baseline quarter is kept
    pub primary_metric: String,
    /// Earliest quarter used only as a rate-of-change baseline, if any
    pub baseline_quarter: Option<QuarterLabel>,
    /// Quarter-encoded identifiers that are not per-entity metrics
    pub exclude: BTreeSet<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            id_column: "Ticker".to_string(),
            primary_metric: "Revenue".to_string(),
            baseline_quarter: None,
            exclude: [
                "GDP",
                "GDPReal",
                "Unemployment",
                "InterestRate",
                "IndustrialProd",
                "Inflation",
                "log2",
                "ShortTermDebtOrCurrentLiab",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

/// Base metric of a column name.
///
/// The name is split on `_`; `KPI_*` names keep their first two tokens so
/// that e.g. `KPI_GrossProfitMargin_2024Q4` maps to `KPI_GrossProfitMargin`.
pub fn base_metric(name: &str) -> &str {
    let mut tokens = name.splitn(3, '_');
    let first = tokens.next().unwrap_or_default();
    match (first, tokens.next()) {
        (KPI_PREFIX, Some(second)) => &name[..KPI_PREFIX.len() + 1 + second.len()],
        _ => first,
    }
}

/// Sorted, de-duplicated quarter labels present in `columns`.
pub fn infer_quarters<S: AsRef<str>>(columns: &[S]) -> Vec<QuarterLabel> {
    columns
        .iter()
        .filter_map(|c| QuarterLabel::split_column(c.as_ref()).map(|(_, q)| q))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorted, de-duplicated base metrics of the quarter-encoded `columns`,
/// minus the identifiers in `exclude`.
///
/// A multi-token name such as `Market_Value_2024Q1` yields `Market`.
/// [`TableSchema::infer`] starts from this set and keeps only the metrics
/// that have at least one `{metric}_{quarter}` column.
pub fn infer_metrics<S: AsRef<str>>(columns: &[S], exclude: &BTreeSet<String>) -> Vec<String> {
    columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| QuarterLabel::split_column(c).is_some())
        .map(base_metric)
        .filter(|m| !exclude.contains(*m))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Typed schema of a wide table: the quarter axis plus, for every metric,
/// the quarters for which a column actually exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    quarters: Vec<QuarterLabel>,
    metrics: BTreeMap<String, Vec<QuarterLabel>>,
}

impl TableSchema {
    /// Infer the schema from column names.
    ///
    /// Metrics come from [`infer_metrics`]; one without any column named
    /// `{metric}_{quarter}` on the quarter axis is left out.
    ///
    /// # Errors
    /// Returns [`FeatureError::NoQuarters`] when no column is quarter-encoded.
    pub fn infer<S: AsRef<str>>(columns: &[S], config: &SchemaConfig) -> Result<Self> {
        let names: BTreeSet<&str> = columns.iter().map(AsRef::as_ref).collect();
        let mut quarters = infer_quarters(columns);

        if let Some(baseline) = config.baseline_quarter {
            let primary = baseline.column(&config.primary_metric);
            if !names.contains(primary.as_str()) {
                tracing::debug!(%baseline, metric = %config.primary_metric, "baseline quarter absent, dropping");
                quarters.retain(|q| *q != baseline);
            }
        }

        if quarters.is_empty() {
            return Err(FeatureError::NoQuarters);
        }

        let mut metrics: BTreeMap<String, Vec<QuarterLabel>> = BTreeMap::new();
        for metric in infer_metrics(columns, &config.exclude) {
            let available: Vec<QuarterLabel> = quarters
                .iter()
                .copied()
                .filter(|q| names.contains(q.column(&metric).as_str()))
                .collect();
            if available.is_empty() {
                tracing::debug!(%metric, "no per-quarter columns under this name, skipping");
                continue;
            }
            metrics.insert(metric, available);
        }

        Ok(Self { quarters, metrics })
    }

    /// Infer the schema of a DataFrame, checking that the identity column exists.
    ///
    /// # Errors
    /// Returns [`FeatureError::MissingColumn`] when the identity column is absent.
    pub fn from_frame(df: &DataFrame, config: &SchemaConfig) -> Result<Self> {
        let columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        if !columns.iter().any(|c| *c == config.id_column) {
            return Err(FeatureError::MissingColumn(config.id_column.clone()));
        }
        Self::infer(&columns, config)
    }

    /// Chronologically ordered quarter axis.
    pub fn quarters(&self) -> &[QuarterLabel] {
        &self.quarters
    }

    /// Metric names in sorted order.
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    /// Number of metrics.
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Quarters for which `metric` has a column (empty when unknown).
    pub fn quarters_for(&self, metric: &str) -> &[QuarterLabel] {
        self.metrics.get(metric).map_or(&[], Vec::as_slice)
    }

    /// Whether `metric` has a column for `quarter`.
    pub fn contains(&self, metric: &str, quarter: QuarterLabel) -> bool {
        self.quarters_for(metric).binary_search(&quarter).is_ok()
    }

    /// Whether the schema knows `metric` at all.
    pub fn has_metric(&self, metric: &str) -> bool {
        self.metrics.contains_key(metric)
    }

    /// Column names of `metric` in chronological order.
    pub fn columns_for(&self, metric: &str) -> Vec<String> {
        self.quarters_for(metric)
            .iter()
            .map(|q| q.column(metric))
            .collect()
    }

    /// All quarter-encoded metric columns known to the schema.
    pub fn metric_columns(&self) -> Vec<String> {
        self.metrics().flat_map(|m| self.columns_for(m)).collect()
    }

    /// Pairs of quarters adjacent on the quarter axis for which `metric`
    /// has both columns.
    ///
    /// This is the coverage of a metric: a series that starts late or has a
    /// hole simply yields fewer pairs.
    pub fn adjacent_pairs(&self, metric: &str) -> Vec<(QuarterLabel, QuarterLabel)> {
        self.quarters
            .windows(2)
            .filter(|w| self.contains(metric, w[0]) && self.contains(metric, w[1]))
            .map(|w| (w[0], w[1]))
            .collect()
    }

    /// Metrics carrying the `KPI_` prefix.
    pub fn kpi_metrics(&self) -> impl Iterator<Item = &str> {
        self.metrics().filter(|m| is_kpi(m))
    }

    /// Metrics that are not KPIs.
    pub fn base_metrics(&self) -> impl Iterator<Item = &str> {
        self.metrics().filter(|m| !is_kpi(m))
    }

    /// Register (or replace) a metric with its available quarters.
    ///
    /// Quarters outside the schema's axis are ignored.
    #[must_use]
    pub fn with_metric(mut self, metric: impl Into<String>, quarters: &[QuarterLabel]) -> Self {
        let mut available: Vec<QuarterLabel> = quarters
            .iter()
            .copied()
            .filter(|q| self.quarters.binary_search(q).is_ok())
            .collect();
        available.sort();
        available.dedup();
        if !available.is_empty() {
            self.metrics.insert(metric.into(), available);
        }
        self
    }
}

/// Whether a metric name is a derived KPI.
pub fn is_kpi(metric: &str) -> bool {
    base_metric(metric) == metric && metric.starts_with("KPI_")
}
