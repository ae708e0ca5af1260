//! Stored OAuth token records keyed by client and account.
//!
//! The raw [`SecretStore`] backends hold opaque strings. This module layers
//! the token record on top of them:
//! - [`StoredToken`] - access/refresh token pair for one account
//! - [`TokenStore`] - get/set/delete a token by `(client, email)`
//! - [`SecretTokenStore`] - [`TokenStore`] over any [`SecretStore`]
//! - [`SecretsOpener`] - opens the token store on demand
//!
//! # Storage Key Convention
//!
//! Keys follow the pattern `token:{client}:{email}`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::{Secret, SecretStore, StoreError, open_store};

/// Client name used when none is configured for an account.
pub const DEFAULT_CLIENT: &str = "default";

const TOKEN_KEY_PREFIX: &str = "token:";

/// OAuth tokens persisted for one account.
///
/// At least one of the two tokens must be non-empty to be usable. Records
/// written through [`TokenStore::set_token`] always carry a refresh token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default, skip_serializing_if = "Secret::is_empty")]
    pub access_token: Secret,

    #[serde(default, skip_serializing_if = "Secret::is_empty")]
    pub refresh_token: Secret,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// A record holding only a refresh token.
    pub fn refresh(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: Secret::new(refresh_token),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// A record holding only an access token.
    pub fn access(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Secret::new(access_token);
        self
    }

    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() || !self.refresh_token.is_empty()
    }
}

/// A parsed `token:{client}:{email}` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKey {
    pub client: String,
    pub email: String,
}

impl TokenKey {
    pub fn new(client: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}:{}", TOKEN_KEY_PREFIX, self.client, self.email)
    }
}

/// Build the storage key for a client/account pair.
pub fn token_key(client: &str, email: &str) -> String {
    TokenKey::new(client.trim(), email.trim()).to_string()
}

/// Parse a storage key back into its client and email.
///
/// Legacy keys without a client (`token:{email}`) map to [`DEFAULT_CLIENT`].
/// Keys with an empty or whitespace-only part are rejected.
pub fn parse_token_key(key: &str) -> Option<TokenKey> {
    let rest = key.strip_prefix(TOKEN_KEY_PREFIX)?;
    let (client, email) = match rest.split_once(':') {
        Some((client, email)) => (client.trim(), email.trim()),
        None => (DEFAULT_CLIENT, rest.trim()),
    };
    if client.is_empty() || email.is_empty() {
        return None;
    }
    Some(TokenKey::new(client, email))
}

/// Token persistence keyed by `(client, email)`.
///
/// `get_token` reports a missing record as [`StoreError::NotFound`] so
/// callers can tell "never authorized" apart from backend failures.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_token(&self, client: &str, email: &str) -> Result<StoredToken, StoreError>;

    async fn set_token(
        &self,
        client: &str,
        email: &str,
        token: &StoredToken,
    ) -> Result<(), StoreError>;

    async fn delete_token(&self, client: &str, email: &str) -> Result<(), StoreError>;
}

/// [`TokenStore`] that serializes records as JSON into a [`SecretStore`].
pub struct SecretTokenStore {
    backend: Box<dyn SecretStore>,
}

impl SecretTokenStore {
    pub fn new(backend: impl SecretStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn from_boxed(backend: Box<dyn SecretStore>) -> Self {
        Self { backend }
    }
}

fn require_email(email: &str) -> Result<(), StoreError> {
    if email.trim().is_empty() {
        return Err(StoreError::InvalidInput {
            message: "missing email".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl TokenStore for SecretTokenStore {
    async fn get_token(&self, client: &str, email: &str) -> Result<StoredToken, StoreError> {
        require_email(email)?;
        let key = token_key(client, email);

        let raw = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        Ok(serde_json::from_str(raw.expose())?)
    }

    async fn set_token(
        &self,
        client: &str,
        email: &str,
        token: &StoredToken,
    ) -> Result<(), StoreError> {
        require_email(email)?;
        if token.refresh_token.is_empty() {
            return Err(StoreError::InvalidInput {
                message: "missing refresh token".to_string(),
            });
        }

        let key = token_key(client, email);
        let raw = Secret::new(serde_json::to_string(token)?);
        self.backend.set(&key, &raw).await?;

        tracing::debug!(client, email, "stored token");
        Ok(())
    }

    async fn delete_token(&self, client: &str, email: &str) -> Result<(), StoreError> {
        require_email(email)?;
        self.backend.delete(&token_key(client, email)).await
    }
}

/// Opens the token store.
///
/// Opening is deferred until a resolution actually needs stored tokens, so
/// callers served by the external config never touch the keyring.
pub trait SecretsOpener: Send + Sync {
    fn open(&self) -> Result<Arc<dyn TokenStore>, StoreError>;
}

/// Opens the OS keyring, falling back to memory when it is unavailable.
#[derive(Debug, Clone)]
pub struct KeyringOpener {
    service_name: String,
}

impl KeyringOpener {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl SecretsOpener for KeyringOpener {
    fn open(&self) -> Result<Arc<dyn TokenStore>, StoreError> {
        let backend = open_store(&self.service_name, true);
        Ok(Arc::new(SecretTokenStore::from_boxed(backend)))
    }
}

/// Hands out an already-open store.
#[derive(Clone)]
pub struct FixedStoreOpener {
    store: Arc<dyn TokenStore>,
}

impl FixedStoreOpener {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

impl SecretsOpener for FixedStoreOpener {
    fn open(&self) -> Result<Arc<dyn TokenStore>, StoreError> {
        Ok(Arc::clone(&self.store))
    }
}
