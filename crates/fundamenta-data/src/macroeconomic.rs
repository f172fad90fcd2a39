//! Macroeconomic series, aggregated to quarters and broadcast onto every row.
//!
//! Monthly series are averaged within each calendar quarter; quarterly
//! series pass through unchanged. The result is a single-row table with
//! `{name}_{quarter}` columns that [`broadcast_macro`] copies onto each
//! entity.

use crate::calendar::quarter_of;
use crate::error::{DataError, Result};
use chrono::NaiveDate;
use fundamenta_features::QuarterLabel;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// FRED observations endpoint.
const FRED_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// Environment variable holding the FRED API key.
pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";

/// Default macro series: `(column name, FRED series id)`.
pub const DEFAULT_MACRO_SERIES: &[(&str, &str)] = &[
    ("GDP", "GDP"),
    ("GDPReal", "GDPC1"),
    ("Unemployment", "UNRATE"),
    ("InterestRate", "FEDFUNDS"),
    ("IndustrialProd", "INDPRO"),
    ("Inflation", "CPIAUCSL"),
];

/// One named observation series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSeries {
    /// Column prefix in the output table
    pub name: String,
    /// Dated observations
    pub observations: Vec<(NaiveDate, f64)>,
}

impl MacroSeries {
    /// Series named `name`.
    pub fn new(name: impl Into<String>, observations: Vec<(NaiveDate, f64)>) -> Self {
        Self {
            name: name.into(),
            observations,
        }
    }

    /// Mean of the finite observations within each calendar quarter.
    pub fn quarterly_means(&self) -> Result<BTreeMap<QuarterLabel, f64>> {
        quarterly_means(&self.observations)
    }
}

/// Mean of the finite observations within each calendar quarter.
///
/// # Errors
/// Fails only for dates outside the representable year range.
pub fn quarterly_means(observations: &[(NaiveDate, f64)]) -> Result<BTreeMap<QuarterLabel, f64>> {
    let mut sums: BTreeMap<QuarterLabel, (f64, usize)> = BTreeMap::new();
    for (date, value) in observations.iter().filter(|(_, v)| v.is_finite()) {
        let entry = sums.entry(quarter_of(*date)?).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    Ok(sums
        .into_iter()
        .map(|(quarter, (sum, n))| (quarter, sum / n as f64))
        .collect())
}

/// Single-row table of `{series}_{quarter}` columns for `quarters`.
///
/// Quarters without an observation are null.
///
/// # Errors
/// Returns polars errors from frame construction.
pub fn macro_row(series: &[MacroSeries], quarters: &[QuarterLabel]) -> Result<DataFrame> {
    let mut sorted = quarters.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut columns = Vec::with_capacity(series.len() * sorted.len());
    for s in series {
        let means = s.quarterly_means()?;
        for quarter in &sorted {
            columns.push(Column::new(
                quarter.column(&s.name).into(),
                vec![means.get(quarter).copied()],
            ));
        }
    }
    Ok(DataFrame::new(columns)?)
}

/// Copy every column of the single-row `macro_table` onto each row of `df`.
///
/// Existing columns with the same name are overwritten.
///
/// # Errors
/// Fails when `macro_table` does not have exactly one row or a column is
/// not numeric.
pub fn broadcast_macro(df: &DataFrame, macro_table: &DataFrame) -> Result<DataFrame> {
    if macro_table.height() != 1 {
        return Err(DataError::Parse(format!(
            "macro table must have one row, found {}",
            macro_table.height()
        )));
    }
    let height = df.height();
    let mut out = df.clone();
    for column in macro_table.get_columns() {
        let value = column.cast(&DataType::Float64)?.f64()?.get(0);
        out.with_column(Column::new(column.name().clone(), vec![value; height]))?;
    }
    tracing::info!(rows = height, columns = macro_table.width(), "broadcast macro series");
    Ok(out)
}

/// Client for the St. Louis Fed FRED observations API.
#[derive(Debug, Clone)]
pub struct FredClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FredClient {
    /// Client using `api_key`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(DataError::Network)?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: FRED_URL.to_string(),
        })
    }

    /// Client keyed from the `FRED_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(FRED_API_KEY_ENV)
            .map_err(|_| DataError::Http(format!("{FRED_API_KEY_ENV} is not set")))?;
        Self::new(key)
    }

    /// Fetch the observations of `series_id`, named `name` in the output.
    pub async fn fetch_series(&self, name: &str, series_id: &str) -> Result<MacroSeries> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
            ])
            .send()
            .await
            .map_err(DataError::Network)?;
        if !response.status().is_success() {
            return Err(DataError::Http(format!(
                "{series_id}: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(DataError::Network)?;
        let observations = parse_observations(&body)?;
        tracing::debug!(series = series_id, points = observations.len(), "fetched macro series");
        Ok(MacroSeries::new(name, observations))
    }

    /// Fetch every `(name, series id)` pair in order.
    pub async fn fetch_all(&self, series: &[(&str, &str)]) -> Result<Vec<MacroSeries>> {
        let mut out = Vec::with_capacity(series.len());
        for (name, id) in series {
            out.push(self.fetch_series(name, id).await?);
        }
        Ok(out)
    }
}

/// Parse a FRED observations body; missing values (`"."`) are skipped.
///
/// # Errors
/// Fails when the body has no `observations` array.
pub fn parse_observations(body: &Value) -> Result<Vec<(NaiveDate, f64)>> {
    let observations = body
        .get("observations")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::Parse("missing observations".to_string()))?;
    Ok(observations
        .iter()
        .filter_map(|o| {
            let date = NaiveDate::parse_from_str(o.get("date")?.as_str()?, "%Y-%m-%d").ok()?;
            let value = o.get("value")?.as_str()?.parse::<f64>().ok()?;
            Some((date, value))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn q(raw: &str) -> QuarterLabel {
        raw.parse().unwrap()
    }

    #[test]
    fn test_quarterly_means_of_monthly_series() {
        let obs = vec![
            (date(2024, 1), 3.0),
            (date(2024, 2), 4.0),
            (date(2024, 3), 5.0),
            (date(2024, 4), 6.0),
            (date(2024, 5), f64::NAN),
        ];
        let means = quarterly_means(&obs).unwrap();
        assert_relative_eq!(means[&q("2024Q1")], 4.0);
        assert_relative_eq!(means[&q("2024Q2")], 6.0);
    }

    #[test]
    fn test_macro_row_columns() {
        let gdp = MacroSeries::new("GDP", vec![(date(2024, 1), 100.0), (date(2024, 4), 101.0)]);
        let row = macro_row(&[gdp], &[q("2024Q2"), q("2024Q1"), q("2024Q3")]).unwrap();
        let names: Vec<&str> = row.get_column_names().into_iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["GDP_2024Q1", "GDP_2024Q2", "GDP_2024Q3"]);
        assert_eq!(row.column("GDP_2024Q3").unwrap().f64().unwrap().get(0), None);
    }

    #[test]
    fn test_broadcast_overwrites_existing() {
        let df = df!("Ticker" => ["A", "B"], "GDP_2024Q1" => [0.0, 0.0]).unwrap();
        let macro_table = df!("GDP_2024Q1" => [100.0], "UNRATE_2024Q1" => [4.0]).unwrap();
        let out = broadcast_macro(&df, &macro_table).unwrap();
        assert_eq!(out.width(), 3);
        let gdp: Vec<Option<f64>> = out.column("GDP_2024Q1").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(gdp, vec![Some(100.0), Some(100.0)]);
    }

    #[test]
    fn test_broadcast_requires_single_row() {
        let df = df!("Ticker" => ["A"]).unwrap();
        let macro_table = df!("GDP_2024Q1" => [1.0, 2.0]).unwrap();
        assert!(broadcast_macro(&df, &macro_table).is_err());
    }

    #[test]
    fn test_parse_observations_skips_missing() {
        let body = json!({"observations": [
            {"date": "2024-01-01", "value": "3.7"},
            {"date": "2024-02-01", "value": "."}
        ]});
        let obs = parse_observations(&body).unwrap();
        assert_eq!(obs, vec![(date(2024, 1), 3.7)]);
    }
}
