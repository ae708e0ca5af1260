//! Retry, backoff and circuit breaking for Google API calls.

mod circuit_breaker;
mod context;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
pub use context::{CallContext, ContextError};
pub use retry::{
    ClassifyError, MAX_5XX_RETRIES, MAX_RATE_LIMIT_RETRIES, RATE_LIMIT_BASE_DELAY, RetryConfig,
    RetryError, SERVER_ERROR_RETRY_DELAY, exponential_backoff, parse_retry_after, with_retry,
};
