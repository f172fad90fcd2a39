//! Market-capitalization categories.
//!
//! Market values are quoted in thousands of dollars. Category bounds are
//! right-open: a value equal to a bound belongs to the larger category.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FundamentaError, Result};

/// Default column holding the vendor market value.
pub const MARKET_VALUE_COLUMN: &str = "Market Value";

/// Default column receiving the category label.
pub const MARKET_CAP_COLUMN: &str = "Market Cap";

/// Market-capitalization category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarketCapCategory {
    /// Below $50M
    Nano,
    /// $50M to $250M
    Micro,
    /// $250M to $2B
    Small,
    /// $2B to $10B
    Mid,
    /// $10B to $200B
    Large,
    /// $200B and above
    Mega,
}

impl MarketCapCategory {
    /// Returns all categories, smallest first.
    pub const fn all() -> [Self; 6] {
        [Self::Nano, Self::Micro, Self::Small, Self::Mid, Self::Large, Self::Mega]
    }

    /// Inclusive lower bound in thousands of dollars.
    pub const fn lower_bound(&self) -> f64 {
        match self {
            Self::Nano => 0.0,
            Self::Micro => 50e3,
            Self::Small => 250e3,
            Self::Mid => 2e6,
            Self::Large => 10e6,
            Self::Mega => 200e6,
        }
    }

    /// Category label as written to tables.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Nano => "Nano-Cap",
            Self::Micro => "Micro-Cap",
            Self::Small => "Small-Cap",
            Self::Mid => "Mid-Cap",
            Self::Large => "Large-Cap",
            Self::Mega => "Mega-Cap",
        }
    }

    /// Category of a market value in thousands of dollars.
    ///
    /// Negative and non-finite values have no category.
    pub fn from_market_value(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Self::all()
            .into_iter()
            .rev()
            .find(|category| value >= category.lower_bound())
    }
}

impl fmt::Display for MarketCapCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for MarketCapCategory {
    type Err = FundamentaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FundamentaError::InvalidParameter(format!("unknown market cap '{s}'")))
    }
}

/// Parse a vendor market-value string such as `"1,234,567.89"`.
///
/// Everything except digits, `.`, `-`, `e` and `E` is stripped first.
pub fn parse_market_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | 'e' | 'E'))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric market values of a column, parsing strings when needed.
pub(crate) fn market_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let col = df
        .column(column)
        .map_err(|_| FundamentaError::MissingColumn(column.to_string()))?;
    if col.dtype() == &DataType::String {
        Ok(col
            .str()?
            .into_iter()
            .map(|v| v.and_then(parse_market_value))
            .collect())
    } else {
        let cast = col.cast(&DataType::Float64)?;
        Ok(cast.f64()?.into_iter().collect())
    }
}

/// Write the category of `value_column` into `output_column`.
///
/// The value column is rewritten as `Float64` with vendor formatting
/// removed. Rows without a parseable value get a null category.
pub fn assign_market_cap(
    df: &DataFrame,
    value_column: &str,
    output_column: &str,
) -> Result<DataFrame> {
    let values = market_values(df, value_column)?;
    let labels: Vec<Option<&str>> = values
        .iter()
        .map(|v| {
            v.and_then(MarketCapCategory::from_market_value)
                .map(|c| c.label())
        })
        .collect();

    let mut out = df.clone();
    out.with_column(Column::new(value_column.into(), values))?;
    out.with_column(Column::new(output_column.into(), labels))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, MarketCapCategory::Nano)]
    #[case(49_999.0, MarketCapCategory::Nano)]
    #[case(50_000.0, MarketCapCategory::Micro)]
    #[case(1_000_000.0, MarketCapCategory::Small)]
    #[case(2_000_000.0, MarketCapCategory::Mid)]
    #[case(150_000_000.0, MarketCapCategory::Large)]
    #[case(3_000_000_000.0, MarketCapCategory::Mega)]
    fn test_category_bounds(#[case] value: f64, #[case] expected: MarketCapCategory) {
        assert_eq!(MarketCapCategory::from_market_value(value), Some(expected));
    }

    #[test]
    fn test_invalid_values_have_no_category() {
        assert_eq!(MarketCapCategory::from_market_value(-1.0), None);
        assert_eq!(MarketCapCategory::from_market_value(f64::NAN), None);
    }

    #[test]
    fn test_label_round_trip() {
        for category in MarketCapCategory::all() {
            let parsed: MarketCapCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("Giga-Cap".parse::<MarketCapCategory>().is_err());
    }

    #[rstest]
    #[case("1,234,567.5", Some(1_234_567.5))]
    #[case("$2.5e6", Some(2.5e6))]
    #[case("-", None)]
    #[case("", None)]
    fn test_parse_market_value(#[case] raw: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_market_value(raw), expected);
    }

    #[test]
    fn test_assign_market_cap() {
        let df = df! {
            "Ticker" => ["A", "B", "C"],
            "Market Value" => ["30,000", "5,000,000", "n/a"],
        }
        .unwrap();
        let out = assign_market_cap(&df, MARKET_VALUE_COLUMN, MARKET_CAP_COLUMN).unwrap();

        let caps: Vec<Option<&str>> = out.column("Market Cap").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(caps, vec![Some("Nano-Cap"), Some("Mid-Cap"), None]);
        let values = out.column("Market Value").unwrap().f64().unwrap();
        assert_eq!(values.get(1), Some(5_000_000.0));
    }
}
