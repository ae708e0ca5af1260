//! Retry policy for rate limits (429) and server errors (5xx).
//!
//! Shared by the HTTP-level [`RetryTransport`](crate::transport::RetryTransport)
//! and by [`with_retry`], which wraps calls returning a typed result.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::circuit_breaker::CircuitBreaker;
use super::context::{CallContext, ContextError};
use crate::error::{CircuitBreakerError, RateLimitError};

/// Maximum number of retries on 429 responses.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial delay for rate-limit exponential backoff.
pub const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Maximum number of retries on 5xx responses.
pub const MAX_5XX_RETRIES: u32 = 1;

/// Fixed delay before retrying a 5xx response.
pub const SERVER_ERROR_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry limits and the breaker they report to.
///
/// Immutable once built; clones share the same circuit breaker.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_rate_limit_retries: u32,
    pub max_5xx_retries: u32,
    pub base_delay: Duration,
    pub server_error_delay: Duration,
    pub circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
            max_5xx_retries: MAX_5XX_RETRIES,
            base_delay: RATE_LIMIT_BASE_DELAY,
            server_error_delay: SERVER_ERROR_RETRY_DELAY,
            circuit_breaker: Some(Arc::new(CircuitBreaker::default())),
        }
    }
}

impl RetryConfig {
    pub(crate) fn breaker_rejects(&self) -> bool {
        self.circuit_breaker.as_ref().is_some_and(|b| b.is_open())
    }

    pub(crate) fn record_success(&self) {
        if let Some(breaker) = &self.circuit_breaker {
            breaker.record_success();
        }
    }

    pub(crate) fn record_failure(&self) {
        if let Some(breaker) = &self.circuit_breaker {
            breaker.record_failure();
        }
    }
}

/// Exponential backoff with up to 50% jitter.
///
/// The result lies in `[base * 2^attempt, 1.5 * base * 2^attempt)`.
pub fn exponential_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    let delay = base.saturating_mul(factor);

    let max_jitter = u64::try_from((delay / 2).as_nanos()).unwrap_or(u64::MAX);
    let jitter = if max_jitter == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..max_jitter)
    };

    delay.saturating_add(Duration::from_nanos(jitter))
}

/// Parse a `Retry-After` header value.
///
/// Accepts delta-seconds or an HTTP date (RFC 1123, RFC 850 or asctime).
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = parse_http_date(value)?;
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Classifies an API error for retry decisions.
///
/// Implemented by adapters over whatever error type an API library returns.
pub trait ClassifyError {
    /// HTTP status code behind the error, if any.
    fn status_code(&self) -> Option<u16>;

    /// Whether the error is worth retrying at all.
    fn is_retryable(&self) -> bool {
        matches!(self.status_code(), Some(code) if code == 429 || code >= 500)
    }

    /// Server-supplied delay hint.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl ClassifyError for reqwest::Error {
    fn status_code(&self) -> Option<u16> {
        self.status().map(|s| s.as_u16())
    }
}

/// Outcome of [`with_retry`] when the call does not succeed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The call failed with a non-retryable error, or 5xx retries ran out.
    #[error(transparent)]
    Api(E),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl<E> RetryError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Run `call` with the same 429/5xx policy as the HTTP transport.
///
/// Unlike the transport, an exhausted rate-limit budget becomes
/// [`RetryError::RateLimited`]; exhausted 5xx retries return the last error.
pub async fn with_retry<T, E, F, Fut>(
    ctx: &CallContext,
    config: &RetryConfig,
    mut call: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ClassifyError,
{
    if config.breaker_rejects() {
        return Err(CircuitBreakerError.into());
    }

    let mut retries_429 = 0u32;
    let mut retries_5xx = 0u32;

    loop {
        let err = match call().await {
            Ok(value) => {
                config.record_success();
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(RetryError::Api(err));
        }

        match err.status_code() {
            Some(429) => {
                if retries_429 >= config.max_rate_limit_retries {
                    return Err(RateLimitError {
                        retries: retries_429,
                    }
                    .into());
                }

                let delay = err
                    .retry_after()
                    .filter(|d| !d.is_zero())
                    .unwrap_or_else(|| exponential_backoff(config.base_delay, retries_429));

                tracing::info!(
                    delay = ?delay,
                    attempt = retries_429 + 1,
                    max_retries = config.max_rate_limit_retries,
                    "rate limited, retrying"
                );

                ctx.sleep(delay).await?;
                retries_429 += 1;
            }
            Some(status) if status >= 500 => {
                config.record_failure();

                if retries_5xx >= config.max_5xx_retries {
                    return Err(RetryError::Api(err));
                }

                tracing::info!(status, attempt = retries_5xx + 1, "server error, retrying");

                ctx.sleep(config.server_error_delay).await?;
                retries_5xx += 1;
            }
            _ => return Err(RetryError::Api(err)),
        }
    }
}
