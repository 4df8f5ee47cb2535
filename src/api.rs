//! Polygon.io client for daily price history, plus the HTTP plumbing shared
//! by every external call: client construction, status checks, and retries.

use crate::error::ApiError;
use crate::models::PriceBar;
use chrono::{DateTime, NaiveDate};
use rand::Rng;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};

const SERVICE: &str = "polygon";

/// Polygon's default host.
pub const DEFAULT_POLYGON_URL: &str = "https://api.polygon.io";

const USER_AGENT: &str = concat!("kynos/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client every external call goes through.
pub fn http_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ApiError::transport("http", e))
}

/// How many extra attempts a transient failure earns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            backoff: Duration::from_millis(250),
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Run `call`, retrying transient failures up to `policy.retries` times.
pub async fn with_retry<T, F, Fut>(
    service: &'static str,
    policy: RetryPolicy,
    mut call: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        let started = Instant::now();
        match call().await {
            Ok(value) => {
                tracing::debug!(service, attempt, elapsed_ms = started.elapsed().as_millis() as u64, "request completed");
                return Ok(value);
            }
            Err(e) if attempt < policy.retries && e.is_transient() => {
                attempt += 1;
                let jitter = rand::thread_rng().gen_range(0..=policy.backoff.as_millis() as u64);
                let delay = policy.backoff * attempt + Duration::from_millis(jitter);
                tracing::warn!(service, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::debug!(service, attempt, error = %e, "request failed");
                return Err(e);
            }
        }
    }
}

/// Turn a non-2xx response into `ApiError::Status`, keeping a bit of the body.
pub async fn check_status(service: &'static str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        body.chars().take(200).collect()
    };

    Err(ApiError::Status {
        service,
        status,
        message,
    })
}

/// Anything that can hand back daily bars for a symbol.
pub trait MarketData {
    async fn daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>, ApiError>;
}

/// Polygon.io aggregates client.
pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    retry: RetryPolicy,
}

impl PolygonClient {
    /// Create a client. A missing key only fails once a request is made.
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            api_key_env: api_key_env.into(),
            retry,
        }
    }

    fn endpoint(&self, symbol: &str, from: NaiveDate, to: NaiveDate, api_key: &str) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc&limit=50000&apiKey={}",
            self.base_url,
            urlencoding::encode(symbol),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
            urlencoding::encode(api_key),
        )
    }
}

impl MarketData for PolygonClient {
    async fn daily_bars(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>, ApiError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ApiError::MissingApiKey {
            env: self.api_key_env.clone(),
        })?;
        let url = self.endpoint(symbol, from, to, api_key);

        tracing::info!(symbol, %from, %to, "fetching daily bars");

        let body = with_retry(SERVICE, self.retry, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ApiError::transport(SERVICE, e))?;
            let response = check_status(SERVICE, response).await?;
            response
                .text()
                .await
                .map_err(|e| ApiError::transport(SERVICE, e))
        })
        .await?;

        parse_aggregates(&body)
    }
}

// Polygon aggregates response structures

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Option<Vec<AggregateBar>>,
}

#[derive(Debug, Deserialize)]
struct AggregateBar {
    /// Window start, epoch milliseconds
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl AggregateBar {
    fn into_bar(self) -> Result<PriceBar, ApiError> {
        let date = DateTime::from_timestamp_millis(self.t)
            .ok_or_else(|| ApiError::malformed(SERVICE, format!("invalid bar timestamp {}", self.t)))?
            .date_naive();

        Ok(PriceBar {
            date,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
        })
    }
}

/// Parse an aggregates body into bars, oldest first.
pub fn parse_aggregates(body: &str) -> Result<Vec<PriceBar>, ApiError> {
    let response: AggregatesResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::malformed(SERVICE, format!("Failed to fetch stock data: {}", e)))?;

    response
        .results
        .ok_or_else(|| ApiError::malformed(SERVICE, "Failed to fetch stock data"))?
        .into_iter()
        .map(AggregateBar::into_bar)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_parse_aggregates() {
        let body = r#"{
            "ticker": "NVDA",
            "status": "OK",
            "results": [
                {"v": 1000.0, "vw": 1.0, "o": 10.0, "c": 11.0, "h": 12.0, "l": 9.0, "t": 1704171600000, "n": 5},
                {"v": 2000, "o": 11.0, "c": 13.5, "h": 14.0, "l": 10.5, "t": 1704258000000}
            ]
        }"#;

        let bars = parse_aggregates(body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[1].close, 13.5);
        assert_eq!(bars[1].volume, 2000.0);
    }

    #[test]
    fn test_missing_results_is_malformed() {
        let err = parse_aggregates(r#"{"status": "ERROR", "error": "Unknown API Key"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Malformed { .. }));
        assert!(err.to_string().contains("Failed to fetch stock data"));
    }

    #[test]
    fn test_bar_missing_field_is_malformed() {
        let err = parse_aggregates(r#"{"results": [{"t": 1704171600000, "o": 1.0}]}"#).unwrap_err();
        assert!(matches!(err, ApiError::Malformed { .. }));
    }

    #[test]
    fn test_endpoint_encodes_symbol_and_dates() {
        let client = PolygonClient::new(
            Client::new(),
            "https://api.polygon.io/",
            Some("key".to_string()),
            "POLYGON_API_KEY",
            RetryPolicy::none(),
        );
        let url = client.endpoint(
            "BRK.B",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            "key",
        );
        assert_eq!(
            url,
            "https://api.polygon.io/v2/aggs/ticker/BRK.B/range/1/day/2024-01-01/2024-03-31?adjusted=true&sort=asc&limit=50000&apiKey=key"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = PolygonClient::new(
            Client::new(),
            DEFAULT_POLYGON_URL,
            None,
            "POLYGON_API_KEY",
            RetryPolicy::none(),
        );
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = client.daily_bars("NVDA", day, day).await.unwrap_err();
        assert_eq!(err.to_string(), "POLYGON_API_KEY is not set");
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            service: "test",
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            message: "busy".to_string(),
        }
    }

    fn quick(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = Cell::new(0);
        let result = with_retry("test", quick(1), || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt == 1 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), ApiError> = with_retry("test", quick(1), || {
            calls.set(calls.get() + 1);
            async { Err(server_error()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_no_retry_for_permanent_failure() {
        let calls = Cell::new(0);
        let result: Result<(), ApiError> = with_retry("test", quick(3), || {
            calls.set(calls.get() + 1);
            async { Err(ApiError::malformed("test", "bad payload")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
