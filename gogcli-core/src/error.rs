//! Structured error values surfaced to the CLI, plus the top-level error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialsError;
use crate::resolver::ResolveError;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::transport::TransportError;

/// No credential source produced a token for this account.
///
/// The user has to run the authorization flow for the account.
#[derive(Debug, Error)]
#[error(
    "no stored credentials for {email} ({service}, client {client}); run `gog auth add {email}` to authorize"
)]
pub struct AuthRequiredError {
    pub service: String,
    pub email: String,
    pub client: String,
    #[source]
    pub cause: StoreError,
}

/// Still rate limited after exhausting every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limit exceeded after {retries} retries")]
pub struct RateLimitError {
    pub retries: u32,
}

/// The circuit breaker is open; no request was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("circuit breaker is open; too many recent server errors, try again later")]
pub struct CircuitBreakerError;

/// Top-level error type encompassing all gogcli errors.
#[derive(Debug, Error)]
pub enum GogError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GogError {
    /// The auth-required payload, if this error carries one.
    pub fn auth_required(&self) -> Option<&AuthRequiredError> {
        match self {
            Self::Resolve(ResolveError::AuthRequired(e)) => Some(e),
            _ => None,
        }
    }
}
