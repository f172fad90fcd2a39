//! Preprocessing ahead of PCA.
//!
//! Feature candidates are the numeric columns of the table, optionally
//! restricted to KPI levels, optionally extended with `log2(v + 2)` columns
//! and optionally stripped of raw fundamentals. The surviving columns are
//! scaled; the column list and scaler parameters are kept so the exact same
//! preprocessing can be replayed on another table.

use crate::error::{ReduceError, Result};
use crate::scale::{FittedScaler, ScalerKind};
use fundamenta_features::QuarterLabel;
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Line items that receive `log2_` columns by default.
pub const DEFAULT_LOG_METRICS: [&str; 5] = [
    "CurrentAssets",
    "CurrentLiabilities",
    "TotalAssets",
    "TotalLiabilities",
    "TotalDebt",
];

/// Name fragments that mark a float column as a derived feature.
pub const DEFAULT_KEEP_MARKERS: [&str; 8] = [
    "QoQ",
    "KPI",
    "GDP",
    "Unemployment",
    "Rate",
    "Industrial",
    "Inflation",
    "log2_",
];

/// Which columns feed a fitted transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSelection {
    /// Every numeric column
    All,
    /// KPI level columns: names containing `KPI` but not `QoQ`
    Kpi,
}

impl ColumnSelection {
    /// Whether a column name is admitted by the selection.
    pub fn admits(self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Kpi => name.contains("KPI") && !name.contains("QoQ"),
        }
    }
}

/// Configuration for preprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Add `log2_{metric}_{quarter}` columns (default: false)
    pub log_transform: bool,
    /// Metrics receiving log columns
    pub log_metrics: Vec<String>,
    /// Drop float columns without any keep marker (default: false)
    pub drop_base: bool,
    /// Markers protecting a float column from `drop_base`
    pub keep_markers: Vec<String>,
    /// Scaling strategy (default: normal quantile transform)
    pub scaler: ScalerKind,
    /// Column-name prefixes never used as features (outputs of earlier fits)
    pub ignore_prefixes: Vec<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            log_transform: false,
            log_metrics: DEFAULT_LOG_METRICS.iter().map(|m| (*m).to_string()).collect(),
            drop_base: false,
            keep_markers: DEFAULT_KEEP_MARKERS.iter().map(|m| (*m).to_string()).collect(),
            scaler: ScalerKind::default(),
            ignore_prefixes: vec!["PCA_".to_string(), "Cluster".to_string()],
        }
    }
}

impl PreprocessConfig {
    /// Candidate feature columns of `df` after selection, log columns and
    /// raw-column drop, in table order.
    ///
    /// # Errors
    /// Propagates polars errors.
    pub fn candidates(&self, df: &DataFrame, selection: ColumnSelection) -> Result<DataFrame> {
        let names: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|c| is_numeric(c.dtype()))
            .map(|c| c.name().to_string())
            .filter(|name| selection.admits(name))
            .filter(|name| !self.ignore_prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .collect();
        let mut frame = df.select(names)?;

        if self.log_transform {
            let mut logs = Vec::new();
            for metric in &self.log_metrics {
                let mut sources: Vec<(QuarterLabel, String)> = frame
                    .get_column_names()
                    .iter()
                    .filter_map(|c| {
                        QuarterLabel::split_column(c.as_str())
                            .filter(|(m, _)| *m == metric.as_str())
                            .map(|(_, q)| (q, c.to_string()))
                    })
                    .collect();
                sources.sort();
                for (_, source) in sources {
                    let values: Vec<Option<f64>> = frame
                        .column(&source)?
                        .cast(&DataType::Float64)?
                        .f64()?
                        .into_iter()
                        .map(|v| v.map(|v| (v + 2.0).log2()))
                        .collect();
                    logs.push(Column::new(format!("log2_{source}").into(), values));
                }
            }
            frame = frame.hstack(&logs)?;
        }

        if self.drop_base {
            let kept: Vec<String> = frame
                .get_columns()
                .iter()
                .filter(|c| {
                    !matches!(c.dtype(), DataType::Float32 | DataType::Float64)
                        || self.keep_markers.iter().any(|m| c.name().contains(m.as_str()))
                })
                .map(|c| c.name().to_string())
                .collect();
            let dropped = frame.width() - kept.len();
            tracing::debug!(dropped, "dropped raw fundamentals");
            frame = frame.select(kept)?;
        }

        Ok(frame)
    }

    /// Fit preprocessing on `df` and return the scaled feature matrix.
    ///
    /// # Errors
    /// Returns [`ReduceError::NoFeatures`] when nothing survives selection
    /// and [`ReduceError::NonFinite`] for NaN, infinite or missing inputs.
    pub fn fit(
        &self,
        df: &DataFrame,
        selection: ColumnSelection,
    ) -> Result<(FittedPreprocessor, Array2<f64>)> {
        let frame = self.candidates(df, selection)?;
        if frame.width() == 0 {
            return Err(ReduceError::NoFeatures);
        }
        let columns: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let raw = frame_matrix(&frame, &columns)?;
        let scaler = self.scaler.fit(&raw)?;
        let scaled = scaler.transform(&raw)?;
        tracing::info!(?selection, rows = raw.nrows(), features = columns.len(), "fitted preprocessing");

        Ok((
            FittedPreprocessor {
                config: self.clone(),
                selection,
                columns,
                scaler,
            },
            scaled,
        ))
    }
}

/// Preprocessing fitted on a training table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    config: PreprocessConfig,
    selection: ColumnSelection,
    columns: Vec<String>,
    scaler: FittedScaler,
}

impl FittedPreprocessor {
    /// Feature columns in fitted order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column selection used at fit time.
    pub const fn selection(&self) -> ColumnSelection {
        self.selection
    }

    /// Replay the fitted preprocessing on `df`.
    ///
    /// # Errors
    /// Returns [`ReduceError::DimensionMismatch`] when `df` yields a different
    /// number of candidate columns, [`ReduceError::MissingColumn`] when a
    /// fitted column is absent and [`ReduceError::NonFinite`] for invalid
    /// values.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let frame = self.config.candidates(df, self.selection)?;
        if frame.width() != self.columns.len() {
            return Err(ReduceError::DimensionMismatch {
                expected: self.columns.len(),
                actual: frame.width(),
            });
        }
        let raw = frame_matrix(&frame, &self.columns)?;
        self.scaler.transform(&raw)
    }
}

const fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Dense `rows x columns` matrix of the named columns.
///
/// # Errors
/// Returns [`ReduceError::MissingColumn`] for an absent column and
/// [`ReduceError::NonFinite`] for the first NaN, infinite or missing cell.
pub fn frame_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    if let Some(missing) = columns.iter().find(|c| df.column(c).is_err()) {
        return Err(ReduceError::MissingColumn(missing.clone()));
    }
    // nulls come back as NaN and are reported with the non-finite cells
    let matrix = df
        .select(columns.iter().map(String::as_str))?
        .to_ndarray::<Float64Type>(IndexOrder::C)?;
    for ((row, j), value) in matrix.indexed_iter() {
        if !value.is_finite() {
            return Err(ReduceError::NonFinite {
                column: columns[j].clone(),
                row,
            });
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> DataFrame {
        df! {
            "Ticker" => &["A", "B", "C"],
            "Location" => &[1i64, 0, 1],
            "TotalAssets_2024Q2" => &[2.0, 6.0, 14.0],
            "Revenue_2024Q2" => &[1.0, 2.0, 3.0],
            "KPI_CurrentRatio_2024Q2" => &[1.5, 1.0, 2.0],
            "KPI_CurrentRatio_QoQ_24Q1_24Q2" => &[0.1, 0.2, 0.3],
            "GDP_2024Q2" => &[3.0, 3.0, 3.0],
            "PCA_all_PC1" => &[0.0, 0.0, 0.0],
        }
        .unwrap()
    }

    fn names(df: &DataFrame) -> Vec<String> {
        df.get_column_names().iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_all_selection_keeps_numeric_columns() {
        let out = PreprocessConfig::default()
            .candidates(&sample(), ColumnSelection::All)
            .unwrap();
        assert_eq!(
            names(&out),
            vec![
                "Location",
                "TotalAssets_2024Q2",
                "Revenue_2024Q2",
                "KPI_CurrentRatio_2024Q2",
                "KPI_CurrentRatio_QoQ_24Q1_24Q2",
                "GDP_2024Q2",
            ]
        );
    }

    #[test]
    fn test_kpi_selection() {
        let out = PreprocessConfig::default()
            .candidates(&sample(), ColumnSelection::Kpi)
            .unwrap();
        assert_eq!(names(&out), vec!["KPI_CurrentRatio_2024Q2"]);
    }

    #[test]
    fn test_log_and_drop_base() {
        let config = PreprocessConfig {
            log_transform: true,
            drop_base: true,
            ..PreprocessConfig::default()
        };
        let out = config.candidates(&sample(), ColumnSelection::All).unwrap();
        assert_eq!(
            names(&out),
            vec![
                "Location",
                "KPI_CurrentRatio_2024Q2",
                "KPI_CurrentRatio_QoQ_24Q1_24Q2",
                "GDP_2024Q2",
                "log2_TotalAssets_2024Q2",
            ]
        );
        let logs = out.column("log2_TotalAssets_2024Q2").unwrap().f64().unwrap();
        assert_relative_eq!(logs.get(0).unwrap(), 2.0);
        assert_relative_eq!(logs.get(2).unwrap(), 4.0);
    }

    #[test]
    fn test_frame_matrix_follows_requested_order() {
        let df = sample();
        let columns = vec!["Revenue_2024Q2".to_string(), "Location".to_string()];
        let matrix = frame_matrix(&df, &columns).unwrap();
        assert_eq!(matrix.dim(), (3, 2));
        assert_relative_eq!(matrix[[2, 0]], 3.0);
        assert_relative_eq!(matrix[[1, 1]], 0.0);

        let missing = vec!["Revenue_2024Q1".to_string()];
        assert!(matches!(
            frame_matrix(&df, &missing),
            Err(ReduceError::MissingColumn(name)) if name == "Revenue_2024Q1"
        ));
    }

    #[test]
    fn test_non_finite_names_column() {
        let df = df! {
            "KPI_Leverage_2024Q2" => &[Some(1.0), None],
        }
        .unwrap();
        let result = PreprocessConfig::default().fit(&df, ColumnSelection::Kpi);
        assert!(matches!(
            result,
            Err(ReduceError::NonFinite { column, row: 1 }) if column == "KPI_Leverage_2024Q2"
        ));
    }

    #[test]
    fn test_transform_rejects_extra_columns() {
        let config = PreprocessConfig {
            scaler: ScalerKind::Standard,
            ..PreprocessConfig::default()
        };
        let (fitted, scaled) = config.fit(&sample(), ColumnSelection::All).unwrap();
        assert_eq!(scaled.ncols(), fitted.columns().len());

        let wider = sample()
            .hstack(&[Column::new("Extra".into(), &[1.0, 2.0, 3.0])])
            .unwrap();
        assert!(matches!(
            fitted.transform(&wider),
            Err(ReduceError::DimensionMismatch { expected: 6, actual: 7 })
        ));
    }

    #[test]
    fn test_empty_selection() {
        let df = df! { "Ticker" => &["A"] }.unwrap();
        assert!(matches!(
            PreprocessConfig::default().fit(&df, ColumnSelection::All),
            Err(ReduceError::NoFeatures)
        ));
    }
}
