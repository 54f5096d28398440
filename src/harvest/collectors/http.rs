//! HTTP access for collectors.
//!
//! Collectors talk to the network only through [`PageFetcher`], which keeps
//! platform adapters testable with canned responses. [`HttpFetcher`] is the
//! production implementation: a `reqwest` client with per-platform request
//! spacing and bounded retries for transient failures.

use crate::config::{ConfigurationError, HarvestSettings, RetryPolicy};
use crate::traits::CollectionError;
use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A single GET request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the response body of a successful (2xx) request.
    async fn fetch(&self, request: &FetchRequest) -> Result<String, CollectionError>;
}

/// Spaces requests to stay under a per-minute budget.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn per_minute(rate: u32) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_secs(60) / rate.max(1),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent, sleeping between tries.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    platform: &str,
    mut attempt: F,
) -> Result<T, CollectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollectionError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut tries = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && tries < max_attempts => {
                let backoff = policy.backoff_for(tries);
                warn!(
                    platform,
                    attempt = tries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                tries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub struct HttpFetcher {
    platform: String,
    client: reqwest::Client,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(
        platform: &str,
        settings: &HarvestSettings,
        rate_limit_per_minute: u32,
    ) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;

        Ok(Self {
            platform: platform.to_string(),
            client,
            limiter: RateLimiter::per_minute(rate_limit_per_minute),
            retry: settings.retry.clone(),
        })
    }

    async fn fetch_once(&self, request: &FetchRequest) -> Result<String, CollectionError> {
        self.limiter.wait().await;

        let mut builder = self.client.get(&request.url).query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        debug!(platform = %self.platform, url = %request.url, "GET");
        let response = builder
            .send()
            .await
            .map_err(|e| CollectionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectionError::HttpStatus {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| CollectionError::Network(e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, CollectionError> {
        with_retry(&self.retry, &self.platform, || self.fetch_once(request)).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CollectionError::HttpStatus {
                    status: 503,
                    url: "u".into(),
                })
            } else {
                Ok("body")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(2), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CollectionError::Network("reset".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(5), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CollectionError::Parse("bad json".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::per_minute(1200); // 50ms apart
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_fetch_request_builder() {
        let req = FetchRequest::get("https://api.example/chart")
            .query("limit", 10)
            .bearer("secret");
        assert_eq!(req.query, vec![("limit".to_string(), "10".to_string())]);
        assert_eq!(
            req.headers,
            vec![("Authorization".to_string(), "Bearer secret".to_string())]
        );
    }
}
