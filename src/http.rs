//! HTTP access with exponential backoff retry logic.
//!
//! Every network call in the pipeline goes through one [`HttpClient`], which
//! is constructed once and shared (it is cheap to clone). It wraps a
//! [`Transport`] with:
//!
//! - retries on transport failures and on status 429, 500, 502, 503, 504
//! - exponential backoff starting at `base_delay`, doubling, capped at `max_delay`
//! - random jitter added to every delay
//! - an optional shared request-per-second limiter
//! - a shared cooldown: a 429/503 answer delays every caller's next request
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use governor::{Quota, RateLimiter};
use rand::{Rng, rng};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant as StdInstant};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, instrument, warn};

use crate::error::{HttpError, IngestError};

/// Status codes that are retried.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues a single GET request. Implementations do not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, HttpError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

/// Retry budget and backoff shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry (doubles with each attempt).
    pub base_delay: Duration,
    /// Upper bound of the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 20,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(180),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}

/// Shared HTTP client: transport, retry policy and throttling state.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    limiter: Option<Arc<DefaultRateLimiter>>,
    cooldown: Arc<Mutex<Option<Instant>>>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("policy", &self.policy)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            limiter: None,
            cooldown: Arc::new(Mutex::new(None)),
        }
    }

    /// Limit the aggregate request rate of every clone of this client.
    pub fn with_rate_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        let quota = Quota::per_second(requests_per_second);
        self.limiter = Some(Arc::new(RateLimiter::direct(quota)));
        self
    }

    /// GET `url`, retrying transient failures.
    ///
    /// Non-retryable statuses (including 404 and other 4xx) are returned as
    /// `Ok` so callers can interpret them.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, HttpError> {
        let total_t0 = StdInstant::now();
        let mut attempt = 0usize;

        loop {
            self.wait_turn().await;

            let attempt_t0 = StdInstant::now();
            let (failure, throttled) = match self.transport.get(url, headers).await {
                Ok(response) if !RETRYABLE_STATUSES.contains(&response.status) => {
                    debug!(
                        status = response.status,
                        bytes = response.body.len(),
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "request completed"
                    );
                    return Ok(response);
                }
                Ok(response) => (
                    format!("HTTP status {}", response.status),
                    matches!(response.status, 429 | 503),
                ),
                Err(e) => (e.to_string(), false),
            };

            attempt += 1;
            if attempt > self.policy.max_retries {
                error!(
                    attempt,
                    max = self.policy.max_retries,
                    elapsed_ms_total = total_t0.elapsed().as_millis(),
                    error = %failure,
                    "request exhausted retries"
                );
                return Err(HttpError::RetriesExhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.policy.delay_for(attempt);
            if throttled {
                self.extend_cooldown(delay);
            }

            warn!(
                attempt,
                max = self.policy.max_retries,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                elapsed_ms_total = total_t0.elapsed().as_millis(),
                ?delay,
                error = %failure,
                "request attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }

    async fn wait_turn(&self) {
        let until = self.cooldown.lock().ok().and_then(|guard| *guard);
        if let Some(until) = until {
            if until > Instant::now() {
                debug!("waiting for shared cooldown");
                sleep_until(until).await;
            }
        }
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    fn extend_cooldown(&self, delay: Duration) {
        let candidate = Instant::now() + delay;
        if let Ok(mut guard) = self.cooldown.lock() {
            match *guard {
                Some(current) if current >= candidate => {}
                _ => *guard = Some(candidate),
            }
        }
    }
}
