//! QoQ / Rate Feature Engine
//!
//! For every metric in the schema this appends:
//! - one QoQ column per adjacent quarter pair the metric covers
//! - `{metric}_Rate`, the OLS slope of the metric's own series
//! - `{metric}_QoQ_Rate`, the OLS slope of its QoQ series
//!
//! Coverage is read from the [`TableSchema`], so a metric that starts late
//! or skips a quarter simply gets fewer columns.

mod qoq;
mod rate;

pub use qoq::{QOQ_CLIP, QOQ_EPSILON, qoq_change, qoq_change_with, qoq_column};
pub use rate::safe_slope;

use crate::error::{FeatureError, Result};
use crate::schema::TableSchema;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for QoQ and Rate features.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QoqConfig {
    /// Denominator used when the previous value is zero (default: 1e-8)
    pub epsilon: f64,
    /// Symmetric clip bound (default: 1000)
    pub clip: f64,
    /// Whether to append `_Rate` and `_QoQ_Rate` slopes (default: true)
    pub rates: bool,
}

impl Default for QoqConfig {
    fn default() -> Self {
        Self {
            epsilon: QOQ_EPSILON,
            clip: QOQ_CLIP,
            rates: true,
        }
    }
}

/// Appends QoQ and Rate columns to a wide table.
#[derive(Debug, Clone, Default)]
pub struct GrowthEngine {
    config: QoqConfig,
}

impl GrowthEngine {
    /// Create an engine with the given configuration.
    pub const fn new(config: QoqConfig) -> Self {
        Self { config }
    }

    /// Append growth features to `df`.
    ///
    /// # Errors
    /// Returns [`FeatureError::InvalidParameter`] for a non-positive epsilon
    /// or clip bound, and [`FeatureError::MissingColumn`] when a column
    /// recorded in `schema` is absent from `df`.
    pub fn compute(&self, df: &DataFrame, schema: &TableSchema) -> Result<DataFrame> {
        let QoqConfig { epsilon, clip, rates } = self.config;
        if !(epsilon > 0.0 && clip > 0.0) {
            return Err(FeatureError::InvalidParameter(format!(
                "epsilon and clip must be positive (got {epsilon}, {clip})"
            )));
        }

        let mut qoq_columns = Vec::new();
        let mut level_rates = Vec::new();
        let mut qoq_rates = Vec::new();

        for metric in schema.metrics() {
            let mut metric_qoq: Vec<Vec<Option<f64>>> = Vec::new();
            for (prev, cur) in schema.adjacent_pairs(metric) {
                let before = series(df, &prev.column(metric))?;
                let after = series(df, &cur.column(metric))?;
                let values: Vec<Option<f64>> = before
                    .iter()
                    .zip(&after)
                    .map(|(p, c)| Some(qoq_change_with((*p)?, (*c)?, epsilon, clip)))
                    .collect();
                qoq_columns.push(Column::new(qoq_column(metric, prev, cur).into(), &values));
                metric_qoq.push(values);
            }

            if !rates {
                continue;
            }
            let levels = schema
                .columns_for(metric)
                .iter()
                .map(|c| series(df, c))
                .collect::<Result<Vec<_>>>()?;
            if levels.len() >= 2 {
                level_rates.push(Column::new(
                    format!("{metric}_Rate").into(),
                    row_slopes(&levels, df.height()),
                ));
            }
            if metric_qoq.len() >= 2 {
                qoq_rates.push(Column::new(
                    format!("{metric}_QoQ_Rate").into(),
                    row_slopes(&metric_qoq, df.height()),
                ));
            }
        }

        tracing::info!(
            qoq = qoq_columns.len(),
            rates = level_rates.len() + qoq_rates.len(),
            "computed growth features"
        );

        let mut columns = qoq_columns;
        columns.extend(level_rates);
        columns.extend(qoq_rates);
        let mut out = df.clone();
        for column in columns {
            out.with_column(column)?;
        }
        Ok(out)
    }
}

fn series(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| FeatureError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Per-row slope over `series` (one inner vector per quarter); missing
/// values enter as NaN and are discarded by [`safe_slope`].
fn row_slopes(series: &[Vec<Option<f64>>], height: usize) -> Vec<f64> {
    (0..height)
        .into_par_iter()
        .map(|row| {
            let values: Vec<f64> = series
                .iter()
                .map(|s| s[row].unwrap_or(f64::NAN))
                .collect();
            safe_slope(&values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaConfig;
    use approx::assert_relative_eq;

    fn sample() -> DataFrame {
        df! {
            "Ticker" => &["A", "B"],
            "Revenue_2024Q1" => &[Some(100.0), Some(10.0)],
            "Revenue_2024Q2" => &[Some(150.0), None],
            "Revenue_2024Q3" => &[Some(300.0), Some(30.0)],
            "EPS_2024Q3" => &[Some(1.0), Some(2.0)],
        }
        .unwrap()
    }

    #[test]
    fn test_columns_and_order() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let out = GrowthEngine::default().compute(&df, &schema).unwrap();
        let names: Vec<String> = out.get_column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            &names[5..],
            &[
                "Revenue_QoQ_24Q1_24Q2",
                "Revenue_QoQ_24Q2_24Q3",
                "Revenue_Rate",
                "Revenue_QoQ_Rate",
            ]
        );
    }

    #[test]
    fn test_missing_cells_propagate() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let out = GrowthEngine::default().compute(&df, &schema).unwrap();
        let qoq = out.column("Revenue_QoQ_24Q1_24Q2").unwrap().f64().unwrap();
        assert_relative_eq!(qoq.get(0).unwrap(), 0.5);
        assert!(qoq.get(1).is_none());

        // B has [10, missing, 30] so its slope is taken over two points
        let rate = out.column("Revenue_Rate").unwrap().f64().unwrap();
        assert_relative_eq!(rate.get(0).unwrap(), 100.0);
        assert_relative_eq!(rate.get(1).unwrap(), 20.0);
    }

    #[test]
    fn test_qoq_rate_values() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let out = GrowthEngine::default().compute(&df, &schema).unwrap();
        // A grows 0.5 then 1.0; B has no finite growth at all
        let rate = out.column("Revenue_QoQ_Rate").unwrap().f64().unwrap();
        assert_relative_eq!(rate.get(0).unwrap(), 0.5);
        assert!(rate.get(1).unwrap().is_nan());
    }

    #[test]
    fn test_recompute_replaces_existing_columns() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let engine = GrowthEngine::default();
        let once = engine.compute(&df, &schema).unwrap();
        let twice = engine.compute(&once, &schema).unwrap();
        assert_eq!(twice.width(), once.width());
        assert_eq!(twice.get_column_names(), once.get_column_names());
        let first = once.column("Revenue_Rate").unwrap().f64().unwrap();
        let second = twice.column("Revenue_Rate").unwrap().f64().unwrap();
        assert_relative_eq!(second.get(0).unwrap(), first.get(0).unwrap());
    }

    #[test]
    fn test_rates_can_be_disabled() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let engine = GrowthEngine::new(QoqConfig {
            rates: false,
            ..QoqConfig::default()
        });
        let out = engine.compute(&df, &schema).unwrap();
        assert!(out.column("Revenue_Rate").is_err());
        assert_eq!(out.width(), 7);
    }

    #[test]
    fn test_invalid_epsilon() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let engine = GrowthEngine::new(QoqConfig {
            epsilon: 0.0,
            ..QoqConfig::default()
        });
        assert!(matches!(
            engine.compute(&df, &schema),
            Err(FeatureError::InvalidParameter(_))
        ));
    }
}
