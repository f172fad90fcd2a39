//! Cached, progress-reporting fundamentals retrieval.
//!
//! Tickers with a fresh cache entry are served from SQLite; the rest go to
//! the statement source with bounded concurrency. Fetched rows are written
//! back to the cache as they complete.

use std::collections::HashMap;
use std::path::PathBuf;

use fundamenta::Result;
use fundamenta::data::{
    FetchConfig, FieldCatalog, FieldResolver, StatementCache, StatementSource,
    TickerFundamentals, fetch_fundamentals_batch, fundamentals_frame,
};
use indicatif::ProgressBar;
use polars::prelude::*;

use super::cache_manager;

/// Cache behaviour for a fetch run.
#[derive(Debug, Clone)]
pub(crate) struct CacheOptions {
    /// Whether to use the cache at all.
    pub use_cache: bool,
    /// Ignore cached rows and fetch everything.
    pub force_refresh: bool,
    /// Cached rows older than this are refetched.
    pub max_age_days: i64,
    /// Explicit cache database path.
    pub path: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
            max_age_days: 7,
            path: None,
        }
    }
}

/// Fetch fundamentals for `tickers` and return the wide table, one row per
/// ticker in input order.
pub(crate) async fn fetch_universe<S: StatementSource + Sync>(
    source: &S,
    tickers: &[String],
    catalog: &FieldCatalog,
    config: &FetchConfig,
    cache_options: &CacheOptions,
    progress: Option<&ProgressBar>,
) -> Result<DataFrame> {
    let quarters = config.quarters()?;
    let resolver = FieldResolver::new(catalog.clone(), &quarters);

    let cache = if cache_options.use_cache {
        match cache_manager::open_cache(cache_options.path.as_ref()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "cache unavailable, fetching everything");
                None
            }
        }
    } else {
        None
    };

    let mut rows: HashMap<String, TickerFundamentals> = HashMap::with_capacity(tickers.len());
    let mut to_fetch = Vec::new();
    for ticker in tickers {
        match cached_row(cache.as_ref(), ticker, &quarters, cache_options) {
            Some(row) => {
                rows.insert(ticker.clone(), row);
            }
            None => to_fetch.push(ticker.clone()),
        }
    }

    if let Some(pb) = progress {
        pb.set_length(tickers.len() as u64);
        pb.set_position(rows.len() as u64);
        if to_fetch.is_empty() {
            pb.set_message("Loading from cache...");
        } else {
            pb.set_message(format!(
                "Fetching {} tickers ({} concurrent)...",
                to_fetch.len(),
                config.concurrency
            ));
        }
    }
    tracing::info!(cached = rows.len(), fetching = to_fetch.len(), "starting retrieval");

    let fetched = fetch_fundamentals_batch(source, &to_fetch, &resolver, config, |row| {
        if let Some(cache) = cache.as_ref()
            && let Err(e) = cache.put(row)
        {
            match progress {
                Some(pb) => pb.suspend(|| {
                    eprintln!("Warning: Failed to cache {}: {}", row.ticker, e);
                }),
                None => eprintln!("Warning: Failed to cache {}: {}", row.ticker, e),
            }
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
    })
    .await;

    for row in fetched {
        rows.insert(row.ticker.clone(), row);
    }
    let ordered: Vec<TickerFundamentals> = tickers
        .iter()
        .map(|t| rows.remove(t).unwrap_or_else(|| TickerFundamentals::empty(t.as_str())))
        .collect();

    Ok(fundamentals_frame(&ordered, catalog, &quarters)?)
}

fn cached_row(
    cache: Option<&StatementCache>,
    ticker: &str,
    quarters: &[fundamenta::features::QuarterLabel],
    options: &CacheOptions,
) -> Option<TickerFundamentals> {
    if options.force_refresh {
        return None;
    }
    let cache = cache?;
    if !cache.has_recent(ticker, options.max_age_days).unwrap_or(false) {
        return None;
    }
    cache.get(ticker, quarters).ok().flatten()
}

/// Print cache location and contents.
pub(crate) fn print_cache_info(path: Option<&PathBuf>) {
    println!("  Cache location: {}", cache_manager::cache_path(path).display());
    if let Some(stats) = cache_manager::open_cache(path)
        .ok()
        .and_then(|cache| cache.get_stats().ok())
    {
        println!(
            "  Cached data: {} values for {} tickers",
            stats.values, stats.tickers
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fundamenta::data::{JsonStatementSource, RawStatements, Statement};

    fn statements(revenue: f64) -> RawStatements {
        let mut raw = RawStatements::default();
        raw.statement_mut(Statement::Income).insert(
            "Total Revenue".to_string(),
            vec![(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(), revenue)],
        );
        raw
    }

    fn config() -> FetchConfig {
        FetchConfig {
            retries: 0,
            pause_ms: 1,
            n_quarters: 2,
            as_of: NaiveDate::from_ymd_opt(2024, 10, 15),
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_fills_and_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonStatementSource::new(dir.path().join("statements"));
        source.store("AAA", &statements(100.0)).await.unwrap();

        let options = CacheOptions {
            path: Some(dir.path().join("cache.db")),
            ..CacheOptions::default()
        };
        let tickers = vec!["AAA".to_string(), "ZZZ".to_string()];
        let catalog = FieldCatalog::default();

        let first = fetch_universe(&source, &tickers, &catalog, &config(), &options, None)
            .await
            .unwrap();
        assert_eq!(first.height(), 2);
        let revenue = first.column("Revenue_2024Q2").unwrap().f64().unwrap();
        assert_eq!(revenue.get(0), Some(100.0));
        assert_eq!(revenue.get(1), None);

        // The cached value wins over a changed source file.
        source.store("AAA", &statements(999.0)).await.unwrap();
        let second = fetch_universe(&source, &tickers, &catalog, &config(), &options, None)
            .await
            .unwrap();
        let revenue = second.column("Revenue_2024Q2").unwrap().f64().unwrap();
        assert_eq!(revenue.get(0), Some(100.0));

        let refreshed = CacheOptions {
            force_refresh: true,
            ..options
        };
        let third = fetch_universe(&source, &tickers, &catalog, &config(), &refreshed, None)
            .await
            .unwrap();
        let revenue = third.column("Revenue_2024Q2").unwrap().f64().unwrap();
        assert_eq!(revenue.get(0), Some(999.0));
    }
}
