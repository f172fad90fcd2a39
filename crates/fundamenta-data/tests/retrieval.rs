//! Batch retrieval against offline and flaky sources.

use chrono::NaiveDate;
use fundamenta_data::{
    DataError, FetchConfig, FieldCatalog, FieldResolver, JsonStatementSource, RawStatements,
    StatementCache, StatementSource, fetch_fundamentals_batch, fundamentals_frame,
    merge_fundamentals,
};
use polars::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn config() -> FetchConfig {
    FetchConfig {
        concurrency: 2,
        retries: 2,
        pause_ms: 1,
        n_quarters: 2,
        as_of: Some(date("2024-07-15")),
    }
}

fn statements(revenue: &[(&str, f64)]) -> RawStatements {
    let mut raw = RawStatements::default();
    raw.income.insert(
        "Total Revenue".to_string(),
        revenue.iter().map(|(d, v)| (date(d), *v)).collect(),
    );
    raw.balance_sheet.insert(
        "TotalAssets".to_string(),
        vec![(date("2024-06-30"), 500.0)],
    );
    raw
}

struct FlakySource {
    failures: usize,
    calls: AtomicUsize,
}

impl StatementSource for FlakySource {
    async fn fetch_statements(&self, ticker: &str) -> fundamenta_data::Result<RawStatements> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(DataError::Http(format!("{ticker}: HTTP 503")));
        }
        Ok(statements(&[("2024-06-30", 42.0)]))
    }
}

#[tokio::test]
async fn test_batch_from_json_directory() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonStatementSource::new(dir.path());
    source
        .store("AAA", &statements(&[("2024-03-31", 100.0), ("2024-06-30", 150.0)]))
        .await
        .unwrap();
    source
        .store("BBB", &statements(&[("2023-12-31", 70.0), ("2024-06-30", 80.0)]))
        .await
        .unwrap();

    let cfg = config();
    let quarters = cfg.quarters().unwrap();
    let catalog = FieldCatalog::default();
    let resolver = FieldResolver::new(catalog.clone(), &quarters);
    let tickers: Vec<String> = ["AAA", "MISSING", "BBB"].iter().map(|t| t.to_string()).collect();

    let mut seen = 0;
    let rows = fetch_fundamentals_batch(&source, &tickers, &resolver, &cfg, |_| seen += 1).await;
    assert_eq!(seen, 3);

    let order: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(order, vec!["AAA", "MISSING", "BBB"]);
    assert!(rows[1].is_empty());

    let df = fundamentals_frame(&rows, &catalog, &quarters).unwrap();
    let names: Vec<&str> = df.get_column_names().into_iter().map(|c| c.as_str()).collect();
    assert_eq!(
        names,
        vec!["Ticker", "Revenue_2024Q1", "Revenue_2024Q2", "TotalAssets_2024Q2"]
    );
    let q1: Vec<Option<f64>> = df.column("Revenue_2024Q1").unwrap().f64().unwrap().into_iter().collect();
    assert_eq!(q1, vec![Some(100.0), None, None]);

    let universe = df!("Ticker" => ["BBB", "AAA", "MISSING"], "Sector" => ["Energy", "Tech", "Tech"]).unwrap();
    let merged = merge_fundamentals(&universe, &df, "Ticker").unwrap();
    let q2: Vec<Option<f64>> = merged.column("Revenue_2024Q2").unwrap().f64().unwrap().into_iter().collect();
    assert_eq!(q2, vec![Some(80.0), Some(150.0), None]);
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let source = FlakySource {
        failures: 2,
        calls: AtomicUsize::new(0),
    };
    let cfg = config();
    let quarters = cfg.quarters().unwrap();
    let resolver = FieldResolver::new(FieldCatalog::default(), &quarters);

    let rows = fetch_fundamentals_batch(&source, &["AAA".to_string()], &resolver, &cfg, |_| {}).await;
    assert_eq!(rows[0].get("Revenue", quarters[1]), Some(42.0));
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_retries_yield_identity_row() {
    let source = FlakySource {
        failures: usize::MAX,
        calls: AtomicUsize::new(0),
    };
    let cfg = config();
    let resolver = FieldResolver::new(FieldCatalog::default(), &cfg.quarters().unwrap());

    let rows = fetch_fundamentals_batch(&source, &["AAA".to_string()], &resolver, &cfg, |_| {}).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), cfg.retries + 1);
}

#[tokio::test]
async fn test_cache_round_trip_of_fetched_rows() {
    let source = FlakySource {
        failures: 0,
        calls: AtomicUsize::new(0),
    };
    let cfg = config();
    let quarters = cfg.quarters().unwrap();
    let resolver = FieldResolver::new(FieldCatalog::default(), &quarters);
    let cache = StatementCache::in_memory().unwrap();

    let rows = fetch_fundamentals_batch(&source, &["AAA".to_string()], &resolver, &cfg, |row| {
        cache.put(row).unwrap();
    })
    .await;

    let cached = cache.get("AAA", &quarters).unwrap().unwrap();
    assert_eq!(cached, rows[0]);
}
