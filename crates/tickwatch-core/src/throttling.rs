//! Per-client throttle and retry wrapper around an [`HttpClient`].
//!
//! Each exchange client owns exactly one [`RateLimitedTransport`]. Callers on
//! the same client queue on its lock, so the effective request order matches
//! call order; two clients never contend with each other.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::provider_policy::RateLimitConfig;
use crate::retry::RetryPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Mutable throttle bookkeeping, guarded by the transport's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub requests_per_minute: u32,
    pub last_request_at: Option<Instant>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub requests_issued: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("request cancelled")]
    Cancelled,
}

pub struct RateLimitedTransport {
    label: &'static str,
    http_client: Arc<dyn HttpClient>,
    limiter: DirectRateLimiter,
    retry: RetryPolicy,
    state: Mutex<RateLimitState>,
}

impl RateLimitedTransport {
    pub fn new(label: &'static str, http_client: Arc<dyn HttpClient>, config: RateLimitConfig) -> Self {
        Self::with_retry_policy(label, http_client, config, config.retry_policy())
    }

    /// Overrides the retry policy derived from `config`; tests pass a
    /// zero-delay policy here.
    pub fn with_retry_policy(
        label: &'static str,
        http_client: Arc<dyn HttpClient>,
        config: RateLimitConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            label,
            http_client,
            limiter: RateLimiter::direct(quota_from_interval(config.min_interval())),
            retry,
            state: Mutex::new(RateLimitState {
                requests_per_minute: config.requests_per_minute.max(1),
                last_request_at: None,
                max_retries: retry.max_retries,
                retry_delay: retry.delay,
                requests_issued: 0,
            }),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn state(&self) -> RateLimitState {
        *self.state.lock().await
    }

    /// Issues `request`, retrying transport errors flagged retryable and 5xx
    /// responses with a fixed delay. A 4xx response returns immediately.
    /// After the last attempt the final response or error is returned as-is.
    pub async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let attempts = self.retry.total_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.throttle(cancel).await?;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                outcome = self.http_client.execute(request.clone()) => outcome,
            };

            let retry_reason = match &outcome {
                Ok(response) if self.retry.should_retry_status(response.status) => {
                    format!("status {}", response.status)
                }
                Ok(_) => return outcome.map_err(TransportError::from),
                Err(error) if error.retryable() => error.message().to_owned(),
                Err(_) => return outcome.map_err(TransportError::from),
            };

            if attempt >= attempts {
                tracing::warn!(
                    exchange = self.label,
                    url = %request.url,
                    attempts,
                    reason = %retry_reason,
                    "request retries exhausted"
                );
                return outcome.map_err(TransportError::from);
            }

            tracing::debug!(
                exchange = self.label,
                url = %request.url,
                attempt,
                reason = %retry_reason,
                "retrying request"
            );

            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    async fn throttle(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            guard = self.state.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            _ = self.limiter.until_ready() => {}
        }

        state.last_request_at = Some(Instant::now());
        state.requests_issued = state.requests_issued.saturating_add(1);
        Ok(())
    }
}

fn quota_from_interval(interval: Duration) -> Quota {
    let period = interval.max(Duration::from_millis(1));
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::MIN)
}
