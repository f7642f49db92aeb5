/// Base HTTP client with rate limiting and retry
use crate::errors::ApiError;
use crate::logger::{self, LogTag};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Rate limiter for API clients
///
/// One request at a time per endpoint class, spaced by the minimum interval
/// implied by the per-minute budget.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        let min_interval = if max_per_minute > 0 {
            Duration::from_secs_f64(60.0 / max_per_minute as f64)
        } else {
            Duration::ZERO
        };

        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            last_request: Arc::new(Mutex::new(None)),
            min_interval,
        }
    }

    /// Wait until the next request is allowed
    pub async fn acquire(&self) -> Result<RateLimitGuard, String> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| format!("Failed to acquire rate limiter permit: {}", e))?;

        if !self.min_interval.is_zero() {
            let mut last = self.last_request.lock().await;
            if let Some(last_time) = *last {
                let elapsed = last_time.elapsed();
                if elapsed < self.min_interval {
                    let sleep_duration = self.min_interval - elapsed;
                    drop(last);
                    tokio::time::sleep(sleep_duration).await;
                    let mut relocked = self.last_request.lock().await;
                    *relocked = Some(Instant::now());
                } else {
                    *last = Some(Instant::now());
                }
            } else {
                *last = Some(Instant::now());
            }
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// RAII guard returned by [`RateLimiter::acquire`]
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}

/// HTTP client wrapper with a hard per-call timeout
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout_secs: u64) -> Result<Self, String> {
        if timeout_secs == 0 {
            return Err("Timeout must be greater than zero".to_string());
        }
        let client = Client::builder()
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One timed GET, parsed as JSON against `T`.
    ///
    /// The per-request timeout aborts the in-flight connection. Failures are
    /// classified at this boundary: timeout/connection problems are tagged
    /// transient, non-2xx statuses and parse failures are validation errors.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify_request_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| ApiError::Schema {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }

    /// GET with retry: only transient errors are retried, with exponential
    /// backoff (base delay doubled per attempt) up to the attempt ceiling.
    /// The rate limiter is re-acquired per attempt so backoff sleeps do not
    /// block other callers.
    pub async fn get_json_with_retry<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
        limiter: &RateLimiter,
        attempts: u32,
        base_delay: Duration,
    ) -> Result<T, ApiError> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        let mut delay = base_delay;
        loop {
            attempt += 1;
            let result = {
                let _guard = limiter.acquire().await.map_err(|e| ApiError::Connection {
                    endpoint: endpoint.to_string(),
                    detail: e,
                })?;
                self.get_json(endpoint, url).await
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    logger::warning(
                        LogTag::Api,
                        &format!(
                            "{} attempt {}/{} failed: {} (retrying in {}ms)",
                            endpoint,
                            attempt,
                            attempts,
                            err,
                            delay.as_millis()
                        ),
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn classify_request_error(&self, endpoint: &str, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ApiError::Connection {
                endpoint: endpoint.to_string(),
                detail: err.to_string(),
            }
        }
    }
}
