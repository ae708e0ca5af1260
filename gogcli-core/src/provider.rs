//! OAuth endpoint configuration.
//!
//! Only Google is supported; the endpoints are still configurable so tests
//! and proxies can point the refresh exchange elsewhere.

use serde::{Deserialize, Serialize};

/// Google's OAuth authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Authorization and token endpoints of an OAuth provider.
///
/// # Example
///
/// ```
/// use gogcli_core::provider::OAuthEndpoints;
///
/// let google = OAuthEndpoints::google();
/// assert_eq!(google.token_url, "https://oauth2.googleapis.com/token");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthEndpoints {
    /// OAuth authorization endpoint URL.
    pub auth_url: String,

    /// OAuth token endpoint URL.
    pub token_url: String,
}

impl OAuthEndpoints {
    pub fn google() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self::google()
    }
}
