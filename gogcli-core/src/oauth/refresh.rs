//! Lazily refreshing token source backed by a stored refresh token.

use async_trait::async_trait;
use chrono::Utc;
use oauth2::{RefreshToken, RequestTokenError, TokenResponse, basic::BasicClient, reqwest::async_http_client};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::model::TokenSourceKind;
use crate::provider::OAuthEndpoints;
use crate::store::Secret;
use crate::token::{Token, TokenError, TokenSource};

use super::create_oauth_client;

/// Upper bound on a single refresh exchange so callers never hang.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Cached tokens are refreshed this long before they expire.
const EXPIRY_BUFFER_SECONDS: i64 = 60;

struct RefreshState {
    refresh_token: Secret,
    cached: Option<Token>,
}

/// Exchanges a refresh token for access tokens on first use and caches the
/// result until it is close to expiry.
///
/// Concurrent callers share one in-flight refresh: the state lock is held
/// across the exchange.
pub struct RefreshingTokenSource {
    client: BasicClient,
    state: Mutex<RefreshState>,
    timeout: Duration,
}

impl RefreshingTokenSource {
    pub fn new(
        endpoints: &OAuthEndpoints,
        client_id: &str,
        client_secret: &str,
        refresh_token: Secret,
    ) -> Result<Self, TokenError> {
        let secret = (!client_secret.is_empty()).then_some(client_secret);
        let client = create_oauth_client(endpoints, client_id, secret)?;

        Ok(Self {
            client,
            state: Mutex::new(RefreshState {
                refresh_token,
                cached: None,
            }),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        })
    }

    /// Override the exchange timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exchange(&self, refresh_token: &Secret) -> Result<(Token, Option<Secret>), TokenError> {
        let refresh_token = RefreshToken::new(refresh_token.expose().to_string());
        let request = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(async_http_client);

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| TokenError::Timeout {
                after: self.timeout,
            })?
            .map_err(|e| TokenError::RefreshFailed {
                message: match &e {
                    RequestTokenError::ServerResponse(body) => body.to_string(),
                    other => other.to_string(),
                },
            })?;

        let mut token = Token::new(response.access_token().secret().as_str());
        if let Some(expires_in) = response.expires_in() {
            let lifetime = chrono::Duration::from_std(expires_in).map_err(|e| {
                TokenError::RefreshFailed {
                    message: format!("invalid expiration duration: {}", e),
                }
            })?;
            token = token.with_expiry(Utc::now() + lifetime);
        }

        let rotated = response
            .refresh_token()
            .map(|rt| Secret::new(rt.secret().as_str()));

        Ok((token, rotated))
    }
}

impl std::fmt::Debug for RefreshingTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshingTokenSource")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for RefreshingTokenSource {
    async fn token(&self) -> Result<Token, TokenError> {
        let mut state = self.state.lock().await;

        if let Some(token) = &state.cached {
            if !token.expires_within(chrono::Duration::seconds(EXPIRY_BUFFER_SECONDS)) {
                return Ok(token.clone());
            }
        }

        tracing::debug!("refreshing access token");
        let (token, rotated) = self.exchange(&state.refresh_token).await?;

        if let Some(refresh_token) = rotated {
            state.refresh_token = refresh_token;
        }
        state.cached = Some(token.clone());

        Ok(token)
    }

    fn kind(&self) -> TokenSourceKind {
        TokenSourceKind::StoredRefresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_token_url() {
        let endpoints = OAuthEndpoints::google().with_token_url("::nope::");
        let result = RefreshingTokenSource::new(&endpoints, "id", "secret", Secret::new("r1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_timeout() {
        let source =
            RefreshingTokenSource::new(&OAuthEndpoints::google(), "id", "", Secret::new("r1"))
                .unwrap();
        assert_eq!(source.timeout, DEFAULT_REFRESH_TIMEOUT);
        assert_eq!(source.kind(), TokenSourceKind::StoredRefresh);
    }
}
