//! Fiscal quarter labels (`YYYYQ#`).

use crate::error::{FeatureError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A fiscal quarter such as `2024Q3`.
///
/// Ordering is chronological, so a sorted `Vec<QuarterLabel>` is the
/// quarter axis of a wide table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuarterLabel {
    year: u16,
    quarter: u8,
}

impl QuarterLabel {
    /// Create a quarter label, rejecting quarters outside 1..=4.
    pub fn new(year: u16, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) || year > 9999 {
            return Err(FeatureError::InvalidQuarter(format!("{year}Q{quarter}")));
        }
        Ok(Self { year, quarter })
    }

    /// Calendar year.
    pub const fn year(&self) -> u16 {
        self.year
    }

    /// Quarter number (1-4).
    pub const fn quarter(&self) -> u8 {
        self.quarter
    }

    /// The quarter immediately before this one.
    pub const fn previous(&self) -> Self {
        if self.quarter > 1 {
            Self {
                year: self.year,
                quarter: self.quarter - 1,
            }
        } else {
            Self {
                year: self.year.saturating_sub(1),
                quarter: 4,
            }
        }
    }

    /// Column suffix, e.g. `_2024Q3`.
    pub fn suffix(&self) -> String {
        format!("_{self}")
    }

    /// Last four characters of the label, e.g. `24Q3`.
    pub fn short(&self) -> String {
        format!("{:02}Q{}", self.year % 100, self.quarter)
    }

    /// Wide-table column name for `metric` in this quarter.
    pub fn column(&self, metric: &str) -> String {
        format!("{metric}_{self}")
    }

    /// Parse the trailing `_YYYYQ#` of a column name.
    ///
    /// Returns the prefix before the underscore together with the label, or
    /// `None` when the column is not quarter-encoded.
    pub fn split_column(name: &str) -> Option<(&str, Self)> {
        let bytes = name.as_bytes();
        if bytes.len() < 8 {
            return None;
        }
        let tail = &bytes[bytes.len() - 7..];
        if tail[0] != b'_' || tail[5] != b'Q' {
            return None;
        }
        if !tail[1..5].iter().all(u8::is_ascii_digit) || !tail[6].is_ascii_digit() {
            return None;
        }
        let year = tail[1..5]
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
        let label = Self::new(year, tail[6] - b'0').ok()?;
        Some((&name[..name.len() - 7], label))
    }
}

impl fmt::Display for QuarterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}Q{}", self.year, self.quarter)
    }
}

impl FromStr for QuarterLabel {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('_');
        let (year, quarter) = trimmed
            .split_once('Q')
            .ok_or_else(|| FeatureError::InvalidQuarter(s.to_string()))?;
        if year.len() != 4 || quarter.len() != 1 {
            return Err(FeatureError::InvalidQuarter(s.to_string()));
        }
        let year = year
            .parse::<u16>()
            .map_err(|_| FeatureError::InvalidQuarter(s.to_string()))?;
        let quarter = quarter
            .parse::<u8>()
            .map_err(|_| FeatureError::InvalidQuarter(s.to_string()))?;
        Self::new(year, quarter)
    }
}

impl Serialize for QuarterLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QuarterLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
