//! KPI Derivation
//!
//! A fixed set of financial ratios computed per quarter from the imputed
//! fundamentals. Output columns are named `KPI_{Name}_{YYYYQ#}`.
//!
//! Division by zero is deliberately left unguarded: an infinite or NaN
//! ratio is a valid output and is handled by later stages.

use crate::error::Result;
use crate::quarter::QuarterLabel;
use crate::schema::{KPI_PREFIX, TableSchema};
use polars::prelude::*;

/// How a KPI combines quarters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KpiKind {
    /// Uses only the current quarter's inputs
    PerQuarter,
    /// Divides by the average of the previous and current quarter;
    /// undefined for the earliest quarter
    TwoQuarterAverage,
}

/// Supported KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kpi {
    /// (Revenue - CostOfRevenue) / Revenue
    GrossProfitMargin,
    /// NetIncome / Revenue
    NetProfitMargin,
    /// CurrentAssets - CurrentLiabilities
    WorkingCapital,
    /// CurrentAssets / CurrentLiabilities
    CurrentRatio,
    /// TotalAssets / TotalEquity
    Leverage,
    /// TotalDebt / TotalEquity
    DebtToEquityRatio,
    /// CashFromOps
    CashFlow,
    /// Revenue / average TotalAssets
    TotalAssetTurnover,
    /// NetIncome / average TotalEquity
    ReturnOnEquity,
    /// NetIncome / average TotalAssets
    ReturnOnAssets,
}

impl Kpi {
    /// All KPIs in derivation order.
    pub const fn all() -> [Self; 10] {
        [
            Self::GrossProfitMargin,
            Self::NetProfitMargin,
            Self::WorkingCapital,
            Self::CurrentRatio,
            Self::Leverage,
            Self::DebtToEquityRatio,
            Self::CashFlow,
            Self::TotalAssetTurnover,
            Self::ReturnOnEquity,
            Self::ReturnOnAssets,
        ]
    }

    /// Short name without the `KPI_` prefix.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GrossProfitMargin => "GrossProfitMargin",
            Self::NetProfitMargin => "NetProfitMargin",
            Self::WorkingCapital => "WorkingCapital",
            Self::CurrentRatio => "CurrentRatio",
            Self::Leverage => "Leverage",
            Self::DebtToEquityRatio => "DebtToEquityRatio",
            Self::CashFlow => "CashFlow",
            Self::TotalAssetTurnover => "TotalAssetTurnover",
            Self::ReturnOnEquity => "ReturnOnEquity",
            Self::ReturnOnAssets => "ReturnOnAssets",
        }
    }

    /// Metric name as it appears in the table, e.g. `KPI_CurrentRatio`.
    pub fn metric(self) -> String {
        format!("{KPI_PREFIX}_{}", self.name())
    }

    /// Base metrics the KPI reads.
    pub const fn inputs(self) -> &'static [&'static str] {
        match self {
            Self::GrossProfitMargin => &["Revenue", "CostOfRevenue"],
            Self::NetProfitMargin => &["NetIncome", "Revenue"],
            Self::WorkingCapital | Self::CurrentRatio => &["CurrentAssets", "CurrentLiabilities"],
            Self::Leverage => &["TotalAssets", "TotalEquity"],
            Self::DebtToEquityRatio => &["TotalDebt", "TotalEquity"],
            Self::CashFlow => &["CashFromOps"],
            Self::TotalAssetTurnover => &["Revenue", "TotalAssets"],
            Self::ReturnOnEquity => &["NetIncome", "TotalEquity"],
            Self::ReturnOnAssets => &["NetIncome", "TotalAssets"],
        }
    }

    /// Quarter combination used by the KPI.
    pub const fn kind(self) -> KpiKind {
        match self {
            Self::TotalAssetTurnover | Self::ReturnOnEquity | Self::ReturnOnAssets => {
                KpiKind::TwoQuarterAverage
            }
            _ => KpiKind::PerQuarter,
        }
    }

    /// Whether every input column needed for `quarter` exists.
    ///
    /// `previous` is the preceding quarter on the table's quarter axis.
    pub fn available(
        self,
        schema: &TableSchema,
        quarter: QuarterLabel,
        previous: Option<QuarterLabel>,
    ) -> bool {
        let current = self.inputs().iter().all(|m| schema.contains(m, quarter));
        match self.kind() {
            KpiKind::PerQuarter => current,
            KpiKind::TwoQuarterAverage => {
                current && previous.is_some_and(|p| schema.contains(self.inputs()[1], p))
            }
        }
    }

    /// Expression computing the KPI for `quarter`, aliased to its column name.
    ///
    /// Returns `None` for two-quarter KPIs when there is no previous quarter.
    pub fn expr(self, quarter: QuarterLabel, previous: Option<QuarterLabel>) -> Option<Expr> {
        let at = |metric: &str, q: QuarterLabel| col(q.column(metric)).cast(DataType::Float64);
        let v = |metric: &str| at(metric, quarter);

        let expr = match self {
            Self::GrossProfitMargin => (v("Revenue") - v("CostOfRevenue")) / v("Revenue"),
            Self::NetProfitMargin => v("NetIncome") / v("Revenue"),
            Self::WorkingCapital => v("CurrentAssets") - v("CurrentLiabilities"),
            Self::CurrentRatio => v("CurrentAssets") / v("CurrentLiabilities"),
            Self::Leverage => v("TotalAssets") / v("TotalEquity"),
            Self::DebtToEquityRatio => v("TotalDebt") / v("TotalEquity"),
            Self::CashFlow => v("CashFromOps"),
            Self::TotalAssetTurnover | Self::ReturnOnEquity | Self::ReturnOnAssets => {
                let prev = previous?;
                let [numerator, denominator] = [self.inputs()[0], self.inputs()[1]];
                let average = (at(denominator, prev) + v(denominator)) / lit(2.0);
                v(numerator) / average
            }
        };
        Some(expr.alias(quarter.column(&self.metric())))
    }
}

/// KPI metadata
#[derive(Debug, Clone)]
pub struct KpiInfo {
    /// KPI variant
    pub kpi: Kpi,
    /// Short name (unique identifier)
    pub name: &'static str,
    /// Brief description of the ratio
    pub description: &'static str,
    /// Base metrics read by the KPI
    pub inputs: &'static [&'static str],
    /// Quarter combination
    pub kind: KpiKind,
}

const fn describe(kpi: Kpi) -> &'static str {
    match kpi {
        Kpi::GrossProfitMargin => "Share of revenue left after cost of revenue",
        Kpi::NetProfitMargin => "Net income per unit of revenue",
        Kpi::WorkingCapital => "Current assets minus current liabilities",
        Kpi::CurrentRatio => "Current assets over current liabilities",
        Kpi::Leverage => "Total assets over shareholders equity",
        Kpi::DebtToEquityRatio => "Total debt over shareholders equity",
        Kpi::CashFlow => "Operating cash flow",
        Kpi::TotalAssetTurnover => "Revenue over two-quarter average total assets",
        Kpi::ReturnOnEquity => "Net income over two-quarter average equity",
        Kpi::ReturnOnAssets => "Net income over two-quarter average total assets",
    }
}

/// Get all available KPI info
pub fn available_kpis() -> Vec<KpiInfo> {
    Kpi::all()
        .into_iter()
        .map(|kpi| KpiInfo {
            kpi,
            name: kpi.name(),
            description: describe(kpi),
            inputs: kpi.inputs(),
            kind: kpi.kind(),
        })
        .collect()
}

/// Get KPI info by short name (`CurrentRatio`) or metric name (`KPI_CurrentRatio`)
pub fn get_kpi_info(name: &str) -> Option<KpiInfo> {
    let short = name
        .strip_prefix(KPI_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(name);
    available_kpis().into_iter().find(|k| k.name == short)
}

/// Derives KPI columns for every quarter where their inputs exist.
#[derive(Debug, Clone)]
pub struct KpiEngine {
    kpis: Vec<Kpi>,
}

impl Default for KpiEngine {
    fn default() -> Self {
        Self {
            kpis: Kpi::all().to_vec(),
        }
    }
}

impl KpiEngine {
    /// Engine computing only the given KPIs.
    pub const fn with_kpis(kpis: Vec<Kpi>) -> Self {
        Self { kpis }
    }

    /// Append KPI columns to `df` and return the extended schema.
    ///
    /// # Errors
    /// Propagates polars errors from evaluating the expressions.
    pub fn derive(&self, df: &DataFrame, schema: &TableSchema) -> Result<(DataFrame, TableSchema)> {
        let quarters = schema.quarters();
        let mut exprs = Vec::new();
        let mut extended = schema.clone();

        for kpi in &self.kpis {
            let mut produced = Vec::new();
            for (i, &quarter) in quarters.iter().enumerate() {
                let previous = i.checked_sub(1).map(|p| quarters[p]);
                if !kpi.available(schema, quarter, previous) {
                    continue;
                }
                if let Some(expr) = kpi.expr(quarter, previous) {
                    exprs.push(expr);
                    produced.push(quarter);
                }
            }
            if produced.is_empty() {
                tracing::warn!(kpi = kpi.name(), "inputs unavailable, skipping");
            } else {
                extended = extended.with_metric(kpi.metric(), &produced);
            }
        }

        let count = exprs.len();
        let out = df.clone().lazy().with_columns(exprs).collect()?;
        tracing::info!(columns = count, rows = out.height(), "derived KPI columns");
        Ok((out, extended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaConfig;
    use approx::assert_relative_eq;

    fn q(raw: &str) -> QuarterLabel {
        raw.parse().unwrap()
    }

    fn sample() -> DataFrame {
        df! {
            "Ticker" => &["A", "B"],
            "Revenue_2024Q1" => &[100.0, 50.0],
            "Revenue_2024Q2" => &[200.0, 0.0],
            "CostOfRevenue_2024Q2" => &[50.0, 10.0],
            "NetIncome_2024Q2" => &[20.0, 5.0],
            "TotalAssets_2024Q1" => &[100.0, 10.0],
            "TotalAssets_2024Q2" => &[300.0, 30.0],
        }
        .unwrap()
    }

    #[test]
    fn test_registry_count() {
        assert_eq!(available_kpis().len(), 10);
        let averaged = available_kpis()
            .into_iter()
            .filter(|k| k.kind == KpiKind::TwoQuarterAverage)
            .count();
        assert_eq!(averaged, 3);
    }

    #[test]
    fn test_get_kpi_info_by_either_name() {
        assert_eq!(get_kpi_info("CurrentRatio").unwrap().kpi, Kpi::CurrentRatio);
        assert_eq!(get_kpi_info("KPI_CurrentRatio").unwrap().kpi, Kpi::CurrentRatio);
        assert!(get_kpi_info("Unknown").is_none());
    }

    #[test]
    fn test_derive_only_available_quarters() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let (out, extended) = KpiEngine::default().derive(&df, &schema).unwrap();

        assert_eq!(extended.quarters_for("KPI_GrossProfitMargin"), &[q("2024Q2")]);
        assert_eq!(extended.quarters_for("KPI_ReturnOnAssets"), &[q("2024Q2")]);
        assert_eq!(extended.quarters_for("KPI_TotalAssetTurnover"), &[q("2024Q2")]);
        assert!(!extended.has_metric("KPI_CurrentRatio"));
        assert!(out.column("KPI_GrossProfitMargin_2024Q1").is_err());

        let gpm = out.column("KPI_GrossProfitMargin_2024Q2").unwrap().f64().unwrap();
        assert_relative_eq!(gpm.get(0).unwrap(), 0.75);

        let roa = out.column("KPI_ReturnOnAssets_2024Q2").unwrap().f64().unwrap();
        assert_relative_eq!(roa.get(0).unwrap(), 0.1);

        let turnover = out.column("KPI_TotalAssetTurnover_2024Q2").unwrap().f64().unwrap();
        assert_relative_eq!(turnover.get(0).unwrap(), 1.0);
    }

    #[test]
    fn test_zero_revenue_yields_non_finite() {
        let df = sample();
        let schema = TableSchema::from_frame(&df, &SchemaConfig::default()).unwrap();
        let (out, _) = KpiEngine::default().derive(&df, &schema).unwrap();
        let npm = out.column("KPI_NetProfitMargin_2024Q2").unwrap().f64().unwrap();
        assert!(npm.get(1).unwrap().is_infinite());
    }
}
