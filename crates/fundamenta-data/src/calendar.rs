//! Calendar quarters of reporting periods.

use crate::error::Result;
use chrono::{Datelike, NaiveDate};
use fundamenta_features::QuarterLabel;

/// Calendar quarter containing `date`.
///
/// # Errors
/// Fails for years outside the `u16` range.
pub fn quarter_of(date: NaiveDate) -> Result<QuarterLabel> {
    let year = u16::try_from(date.year()).map_err(|_| {
        crate::error::DataError::Parse(format!("year out of range: {}", date.year()))
    })?;
    let quarter = (date.month0() / 3 + 1) as u8;
    Ok(QuarterLabel::new(year, quarter)?)
}

/// Most recent quarter that has fully ended before `as_of`.
///
/// # Errors
/// Fails for years outside the `u16` range.
pub fn last_completed_quarter(as_of: NaiveDate) -> Result<QuarterLabel> {
    Ok(quarter_of(as_of)?.previous())
}

/// The last `n` completed quarters relative to `as_of`, most recent first.
///
/// # Errors
/// Fails for years outside the `u16` range.
pub fn last_n_completed_quarters(n: usize, as_of: NaiveDate) -> Result<Vec<QuarterLabel>> {
    let mut quarter = last_completed_quarter(as_of)?;
    let mut quarters = Vec::with_capacity(n);
    for _ in 0..n {
        quarters.push(quarter);
        quarter = quarter.previous();
    }
    Ok(quarters)
}
