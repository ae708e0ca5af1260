//! Bearer tokens and the sources that yield them.
//!
//! This module provides:
//! - [`Token`] - A bearer access token with optional expiry
//! - [`TokenSource`] - Trait for anything that can hand out a current token
//! - [`StaticTokenSource`] - A fixed token with no refresh or expiry handling

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TokenSourceKind;
use crate::store::Secret;

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Token refresh failed.
    #[error("token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// The token endpoint did not answer within the refresh timeout.
    #[error("token refresh timed out after {after:?}")]
    Timeout { after: std::time::Duration },

    /// OAuth client setup failed.
    #[error("OAuth flow failed: {message}")]
    OAuthError { message: String },

    /// The source has no token to give.
    #[error("token unavailable: {message}")]
    Unavailable { message: String },
}

/// A bearer access token with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// The access token value.
    pub access_token: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// When this token expires (None if unknown or non-expiring).
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a new bearer token without an expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    /// Create a token with an expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if this token will expire within the given duration.
    ///
    /// Tokens without an expiry never expire.
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }

    /// Value for an `Authorization` header.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token.expose())
    }
}

/// Yields a currently-valid bearer token on demand.
///
/// Implementations may refresh internally and must be safe to share
/// across concurrent calls.
#[async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    async fn token(&self) -> Result<Token, TokenError>;

    /// Which credential backend this source came from.
    fn kind(&self) -> TokenSourceKind;
}

/// A token source that always returns the same token.
///
/// No expiry handling: the caller is responsible for the token's validity.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: Token,
    kind: TokenSourceKind,
}

impl StaticTokenSource {
    pub fn new(access_token: impl Into<String>, kind: TokenSourceKind) -> Self {
        Self {
            token: Token::new(access_token),
            kind,
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        Ok(self.token.clone())
    }

    fn kind(&self) -> TokenSourceKind {
        self.kind
    }
}
