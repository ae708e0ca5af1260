//! OAuth 2.0 refresh-token exchange.
//!
//! The interactive consent flow lives outside this crate; here we only turn
//! a stored refresh token into access tokens.
//!
//! # Features
//!
//! This module is only available when the `oauth` feature is enabled.

mod refresh;

pub use refresh::{DEFAULT_REFRESH_TIMEOUT, RefreshingTokenSource};

use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, TokenUrl, basic::BasicClient};

use crate::provider::OAuthEndpoints;
use crate::token::TokenError;

/// Create an OAuth2 client for the given endpoints.
///
/// Client credentials are sent in the request body, which is what Google's
/// token endpoint expects.
pub fn create_oauth_client(
    endpoints: &OAuthEndpoints,
    client_id: impl Into<String>,
    client_secret: Option<impl Into<String>>,
) -> Result<BasicClient, TokenError> {
    let auth_url = AuthUrl::new(endpoints.auth_url.clone()).map_err(|e| TokenError::OAuthError {
        message: format!("invalid auth URL: {}", e),
    })?;

    let token_url = TokenUrl::new(endpoints.token_url.clone()).map_err(|e| {
        TokenError::OAuthError {
            message: format!("invalid token URL: {}", e),
        }
    })?;

    let client = BasicClient::new(
        ClientId::new(client_id.into()),
        client_secret.map(|s| ClientSecret::new(s.into())),
        auth_url,
        Some(token_url),
    )
    .set_auth_type(AuthType::RequestBody);

    Ok(client)
}
