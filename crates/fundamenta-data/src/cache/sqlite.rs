//! SQLite cache of resolved `(ticker, metric, quarter) -> value` rows.

use crate::error::{DataError, Result};
use crate::source::{QuarterValues, TickerFundamentals};
use chrono::{DateTime, Utc};
use fundamenta_features::QuarterLabel;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::Path;

/// SQLite cache for resolved fundamentals.
#[derive(Debug)]
pub struct StatementCache {
    conn: Connection,
}

impl StatementCache {
    /// Open (or create) a cache file.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fundamentals (
                ticker TEXT NOT NULL,
                metric TEXT NOT NULL,
                quarter TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (ticker, metric, quarter)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fetched (
                ticker TEXT PRIMARY KEY,
                fetched_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fundamentals_ticker ON fundamentals(ticker)",
            [],
        )?;

        Ok(())
    }

    /// When `ticker` was last stored, if ever.
    pub fn fetched_at(&self, ticker: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT fetched_at FROM fetched WHERE ticker = ?1",
                params![ticker],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DataError::Parse(format!("invalid timestamp {s}: {e}")))
        })
        .transpose()
    }

    /// True when `ticker` was stored within the last `max_age_days`.
    pub fn has_recent(&self, ticker: &str, max_age_days: i64) -> Result<bool> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        Ok(self.fetched_at(ticker)?.is_some_and(|at| at >= cutoff))
    }

    /// Cached values of `ticker` restricted to `quarters`.
    ///
    /// Returns `None` when the ticker has never been stored.
    pub fn get(&self, ticker: &str, quarters: &[QuarterLabel]) -> Result<Option<TickerFundamentals>> {
        if self.fetched_at(ticker)?.is_none() {
            return Ok(None);
        }
        let allowed: BTreeSet<QuarterLabel> = quarters.iter().copied().collect();

        let mut stmt = self
            .conn
            .prepare("SELECT metric, quarter, value FROM fundamentals WHERE ticker = ?1")?;
        let rows = stmt.query_map(params![ticker], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut values = QuarterValues::new();
        for row in rows {
            let (metric, quarter, value) = row?;
            let quarter: QuarterLabel = quarter.parse()?;
            if allowed.contains(&quarter) {
                values.insert((metric, quarter), value);
            }
        }
        Ok(Some(TickerFundamentals {
            ticker: ticker.to_string(),
            values,
        }))
    }

    /// Replace the cached values of one ticker.
    ///
    /// Rows with no values are not recorded, so the ticker is fetched again
    /// on the next run.
    pub fn put(&self, row: &TickerFundamentals) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM fundamentals WHERE ticker = ?1",
            params![row.ticker],
        )?;
        for ((metric, quarter), value) in &row.values {
            tx.execute(
                "INSERT INTO fundamentals (ticker, metric, quarter, value) VALUES (?1, ?2, ?3, ?4)",
                params![row.ticker, metric, quarter.to_string(), value],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO fetched (ticker, fetched_at) VALUES (?1, ?2)",
            params![row.ticker, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Clear all cached data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM fundamentals", [])?;
        self.conn.execute("DELETE FROM fetched", [])?;
        Ok(())
    }

    /// Clear cached data for one ticker.
    pub fn clear_ticker(&self, ticker: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM fundamentals WHERE ticker = ?1", params![ticker])?;
        self.conn
            .execute("DELETE FROM fetched WHERE ticker = ?1", params![ticker])?;
        Ok(())
    }

    /// Get cache statistics.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let values: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fundamentals", [], |row| row.get(0))?;
        let tickers: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fetched", [], |row| row.get(0))?;

        Ok(CacheStats {
            values: values as usize,
            tickers: tickers as usize,
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached values
    pub values: usize,
    /// Number of tickers stored
    pub tickers: usize,
}
