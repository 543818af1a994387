//! HTTP fetching with an optional exponential backoff retry decorator.
//!
//! # Architecture
//!
//! - [`Fetch`]: Core trait, one request in, one response body out
//! - [`HttpFetcher`]: `reqwest` implementation built from an explicit [`ClientConfig`]
//! - [`RetryFetch`]: Decorator that retries transient failures of any [`Fetch`]
//!
//! The client carries a cookie store so a warm-up request can collect the
//! session cookies some upstreams require before they answer the real request.
//!
//! # Retry Strategy
//!
//! Only transient failures are retried (timeouts, connection errors, HTTP 403,
//! 429 and 5xx). The delay doubles per attempt from the base delay, is capped
//! at 30 seconds and gets 0-250 ms of random jitter.

use crate::config::{ClientConfig, Method, RequestConfig};
use crate::error::FeedError;
use rand::{Rng, rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// One outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Sent as a JSON body.
    pub body: Option<serde_json::Value>,
}

impl FetchRequest {
    /// A bare GET, used for warm-up requests.
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::Get,
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// The configured request, aimed at `url` (the primary or a fallback).
    pub fn from_config(config: &RequestConfig, url: &str) -> Self {
        Self {
            method: config.method,
            url: url.to_string(),
            headers: config.headers.clone(),
            body: config.body.clone(),
        }
    }
}

/// Trait for fetching a response body.
///
/// Implementations return the body only for 2xx responses; any other status
/// is a [`FeedError::Status`].
pub trait Fetch {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FeedError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, FeedError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FeedError::Config(format!("bad header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FeedError::Config(format!("bad value for header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

impl HttpFetcher {
    /// Build a client with the configured user agent, timeout and base headers.
    pub fn new(config: &ClientConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(header_map(&config.headers)?)
            .timeout(config.timeout())
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(method = ?request.method, url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FeedError> {
        let t0 = Instant::now();
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let mut builder = builder.headers(header_map(&request.headers)?);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.inspect_err(|e| {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "Request failed");
        })?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "Non-success status");
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }
        let body = resp.text().await?;
        debug!(bytes = body.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched");
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    /// Wrap `inner`, retrying transient failures up to `max_retries` times.
    ///
    /// ```ignore
    /// let fetcher = RetryFetch::new(HttpFetcher::new(&config.client)?, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<String, FeedError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(request).await {
                Ok(body) => return Ok(body),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(e);
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned outcomes and counts calls.
    struct Scripted {
        outcomes: Mutex<Vec<Result<String, FeedError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String, FeedError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl Fetch for Scripted {
        async fn fetch(&self, _request: &FetchRequest) -> Result<String, FeedError> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("exhausted".to_string()))
        }
    }

    fn status(code: u16) -> FeedError {
        FeedError::Status {
            status: code,
            url: "https://example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_status() {
        let inner = Scripted::new(vec![Err(status(503)), Err(status(429)), Ok("body".to_string())]);
        let fetcher = RetryFetch::new(inner, 3, StdDuration::from_millis(1));
        let body = fetcher.fetch(&FetchRequest::get("https://example.com")).await.unwrap();
        assert_eq!(body, "body");
        assert_eq!(fetcher.inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let inner = Scripted::new(vec![Err(status(500)), Err(status(500)), Err(status(500))]);
        let fetcher = RetryFetch::new(inner, 1, StdDuration::from_millis(1));
        let err = fetcher.fetch(&FetchRequest::get("https://example.com")).await.unwrap_err();
        assert!(matches!(err, FeedError::Status { status: 500, .. }));
        assert_eq!(fetcher.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_final_errors_are_not_retried() {
        let inner = Scripted::new(vec![Err(status(404))]);
        let fetcher = RetryFetch::new(inner, 5, StdDuration::from_millis(1));
        assert!(fetcher.fetch(&FetchRequest::get("https://example.com")).await.is_err());
        assert_eq!(fetcher.inner.calls(), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let fetcher = RetryFetch::new(Scripted::new(Vec::new()), 50, StdDuration::from_secs(1));
        let first = fetcher.backoff(1);
        assert!(first >= StdDuration::from_secs(1) && first <= StdDuration::from_millis(1250));
        let late = fetcher.backoff(40);
        assert!(late <= StdDuration::from_millis(30_250));
    }

    #[test]
    fn test_request_from_config_targets_given_url() {
        let config: RequestConfig = serde_yaml::from_str(
            "url: https://primary.example.com\nmethod: POST\nbody: {category: all}\nheaders: {Origin: https://scanx.trade}\n",
        )
        .unwrap();
        let req = FetchRequest::from_config(&config, "https://fallback.example.com");
        assert_eq!(req.url, "https://fallback.example.com");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body, Some(serde_json::json!({"category": "all"})));
        assert_eq!(req.headers["Origin"], "https://scanx.trade");
    }

    #[test]
    fn test_client_builds_from_config() {
        let mut config = ClientConfig::default();
        config.headers.insert("Accept-Language".to_string(), "en-US".to_string());
        assert!(HttpFetcher::new(&config).is_ok());

        config.headers.insert("Bad Header".to_string(), "x".to_string());
        assert!(matches!(HttpFetcher::new(&config).unwrap_err(), FeedError::Config(_)));
    }
}
