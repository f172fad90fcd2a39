//! Quarterly statements from the Yahoo Finance fundamentals time-series API.

use super::catalog::Statement;
use super::{RawStatements, StatementSource};
use crate::error::{DataError, Result};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Time-series endpoint; the symbol is appended to the path.
const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";

/// Default minimum spacing between requests.
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(250);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)";

/// Start of the requested window (2015-08-22); the API caps history anyway.
const PERIOD_START: i64 = 1_440_201_600;

/// Series requested from the API and the statement each belongs to.
const SERIES: &[(Statement, &str)] = &[
    (Statement::Income, "TotalRevenue"),
    (Statement::Income, "OperatingRevenue"),
    (Statement::Income, "OperatingIncome"),
    (Statement::Income, "NetIncome"),
    (Statement::Income, "NetIncomeCommonStockholders"),
    (Statement::Income, "DilutedEPS"),
    (Statement::Income, "BasicEPS"),
    (Statement::Income, "CostOfRevenue"),
    (Statement::Income, "InterestExpense"),
    (Statement::Income, "InterestExpenseNonOperating"),
    (Statement::Income, "TaxProvision"),
    (Statement::Income, "PretaxIncome"),
    (Statement::Income, "OperatingExpense"),
    (Statement::Income, "OtherOperatingExpenses"),
    (Statement::BalanceSheet, "CashAndCashEquivalents"),
    (Statement::BalanceSheet, "CashCashEquivalentsAndShortTermInvestments"),
    (Statement::BalanceSheet, "TotalAssets"),
    (Statement::BalanceSheet, "TotalLiabilitiesNetMinorityInterest"),
    (Statement::BalanceSheet, "CurrentDebt"),
    (Statement::BalanceSheet, "LongTermDebt"),
    (Statement::BalanceSheet, "LongTermDebtAndCapitalLeaseObligation"),
    (Statement::BalanceSheet, "StockholdersEquity"),
    (Statement::BalanceSheet, "TotalEquityGrossMinorityInterest"),
    (Statement::BalanceSheet, "CurrentLiabilities"),
    (Statement::BalanceSheet, "CurrentAssets"),
    (Statement::BalanceSheet, "TotalDebt"),
    (Statement::CashFlow, "OperatingCashFlow"),
    (Statement::CashFlow, "CapitalExpenditure"),
    (Statement::CashFlow, "InterestPaidSupplementalData"),
];

/// Period type prefix of quarterly series.
const QUARTERLY: &str = "quarterly";

struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// Map a universe ticker onto the Yahoo symbol convention (`BRK.B` -> `BRK-B`).
pub fn yahoo_symbol(ticker: &str) -> String {
    ticker.trim().to_uppercase().replace(['.', '/'], "-")
}

/// Yahoo Finance statement source with request spacing.
#[derive(Clone)]
pub struct YahooStatementSource {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    base_url: String,
}

impl std::fmt::Debug for YahooStatementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooStatementSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl YahooStatementSource {
    /// Source with the default request spacing.
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(DEFAULT_RATE_LIMIT)
    }

    /// Source that waits at least `min_interval` between requests.
    pub fn with_rate_limit(min_interval: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(DataError::Network)?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(min_interval))),
            base_url: TIMESERIES_URL.to_string(),
        })
    }

    /// Point the source at another host serving the same API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_url(&self, symbol: &str) -> String {
        let types: Vec<String> = SERIES
            .iter()
            .map(|(_, key)| format!("{QUARTERLY}{key}"))
            .collect();
        format!(
            "{}/{symbol}?symbol={symbol}&type={}&period1={PERIOD_START}&period2={}",
            self.base_url,
            types.join(","),
            Utc::now().timestamp()
        )
    }

    async fn fetch(&self, ticker: &str) -> Result<RawStatements> {
        let symbol = yahoo_symbol(ticker);
        if symbol.is_empty() {
            return Err(DataError::InvalidSymbol(ticker.to_string()));
        }

        self.rate_limiter.lock().await.wait().await;

        let response = self
            .client
            .get(self.request_url(&symbol))
            .send()
            .await
            .map_err(DataError::Network)?;
        if !response.status().is_success() {
            return Err(DataError::Http(format!(
                "{symbol}: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response.json().await.map_err(DataError::Network)?;
        let statements = parse_timeseries(&body)?;
        if statements.is_empty() {
            return Err(DataError::MissingData {
                symbol,
                reason: "no quarterly series returned".to_string(),
            });
        }
        tracing::debug!(
            ticker,
            income = statements.income.len(),
            balance_sheet = statements.balance_sheet.len(),
            cash_flow = statements.cash_flow.len(),
            "fetched statements"
        );
        Ok(statements)
    }
}

impl StatementSource for YahooStatementSource {
    async fn fetch_statements(&self, ticker: &str) -> Result<RawStatements> {
        self.fetch(ticker).await
    }
}

fn statement_of(key: &str) -> Option<Statement> {
    SERIES
        .iter()
        .find(|(_, k)| *k == key)
        .map(|(statement, _)| *statement)
}

/// Parse a time-series response body into statements.
///
/// Each result carries its series under the `quarterly{Key}` field as a
/// list of points with `asOfDate` and `reportedValue.raw`; null points and
/// unknown keys are skipped.
///
/// # Errors
/// Fails when the body has no `timeseries.result` array.
pub fn parse_timeseries(body: &Value) -> Result<RawStatements> {
    let results = body
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::Parse("missing timeseries.result".to_string()))?;

    let mut statements = RawStatements::default();
    for result in results {
        let Some(object) = result.as_object() else {
            continue;
        };
        for (field, points) in object {
            let Some(key) = field.strip_prefix(QUARTERLY) else {
                continue;
            };
            let Some(statement) = statement_of(key) else {
                continue;
            };
            let parsed: Vec<(NaiveDate, f64)> = points
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|point| {
                    let date = point.get("asOfDate")?.as_str()?;
                    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                    let value = point.pointer("/reportedValue/raw")?.as_f64()?;
                    Some((date, value))
                })
                .collect();
            if !parsed.is_empty() {
                statements
                    .statement_mut(statement)
                    .insert(key.to_string(), parsed);
            }
        }
    }
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("BRK.B", "BRK-B")]
    #[case(" aapl ", "AAPL")]
    #[case("BF/A", "BF-A")]
    fn test_yahoo_symbol(#[case] ticker: &str, #[case] expected: &str) {
        assert_eq!(yahoo_symbol(ticker), expected);
    }

    #[test]
    fn test_parse_timeseries() {
        let body = json!({
            "timeseries": {
                "result": [
                    {
                        "meta": {"symbol": ["AAA"], "type": ["quarterlyTotalRevenue"]},
                        "timestamp": [1711843200],
                        "quarterlyTotalRevenue": [
                            {"asOfDate": "2024-03-31", "reportedValue": {"raw": 120.5, "fmt": "120.5"}},
                            null
                        ]
                    },
                    {
                        "meta": {"symbol": ["AAA"], "type": ["quarterlyOperatingCashFlow"]},
                        "quarterlyOperatingCashFlow": [
                            {"asOfDate": "2024-03-31", "reportedValue": {"raw": -3.0}}
                        ]
                    },
                    {
                        "meta": {"symbol": ["AAA"], "type": ["quarterlyUnknownThing"]},
                        "quarterlyUnknownThing": [
                            {"asOfDate": "2024-03-31", "reportedValue": {"raw": 1.0}}
                        ]
                    }
                ],
                "error": null
            }
        });

        let statements = parse_timeseries(&body).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(statements.income["TotalRevenue"], vec![(date, 120.5)]);
        assert_eq!(statements.cash_flow["OperatingCashFlow"], vec![(date, -3.0)]);
        assert!(statements.balance_sheet.is_empty());
        assert_eq!(statements.income.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(parse_timeseries(&json!({"chart": {}})).is_err());
    }

    #[test]
    fn test_request_url_lists_quarterly_series() {
        let source = YahooStatementSource::new().unwrap();
        let url = source.request_url("AAA");
        assert!(url.starts_with(TIMESERIES_URL));
        assert!(url.contains("quarterlyTotalRevenue,quarterlyOperatingRevenue"));
        assert!(url.contains("symbol=AAA"));
    }
}
