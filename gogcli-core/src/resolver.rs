//! Token-source resolution.
//!
//! For an account and a target service, [`TokenSourceResolver`] tries the
//! credential backends in a fixed order and returns the first token source
//! it can build:
//!
//! 1. a pre-issued token from the external token config,
//! 2. a service-account key,
//! 3. a stored access token, used as-is,
//! 4. a stored refresh token, exchanged lazily on first use.
//!
//! A backend that is not configured is skipped. A backend that is
//! configured but fails ends resolution with its error.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, GogConfig};
use crate::credentials::{
    ClientResolver, ConfiguredClients, CredentialReader, CredentialsError, FileCredentialReader,
};
use crate::error::AuthRequiredError;
use crate::external_config::{ExternalConfigReader, FileExternalConfig};
use crate::model::{Service, TokenSourceKind};
use crate::provider::OAuthEndpoints;
use crate::secrets::{KeyringOpener, SecretsOpener, StoredToken};
use crate::service_account::{KeyFileServiceAccounts, ServiceAccountError, ServiceAccountProvider};
use crate::store::StoreError;
use crate::token::{StaticTokenSource, TokenError, TokenSource};

/// Error type for token-source resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No credential source is available; the account must be authorized.
    #[error(transparent)]
    AuthRequired(#[from] AuthRequiredError),

    #[error("read external token config: {0}")]
    Config(#[from] ConfigError),

    #[error("service account token source: {0}")]
    ServiceAccount(#[from] ServiceAccountError),

    #[error("resolve client: {0}")]
    Client(#[source] CredentialsError),

    #[error("read credentials: {0}")]
    Credentials(#[source] CredentialsError),

    #[error("open secrets store: {0}")]
    OpenStore(#[source] StoreError),

    #[error("get token for {email}: {source}")]
    Store {
        email: String,
        #[source]
        source: StoreError,
    },

    #[error("token source: {0}")]
    Token(#[from] TokenError),
}

/// Builds token sources from the configured credential backends.
///
/// Every backend sits behind a trait object so each can be replaced
/// independently, in tests or by embedding applications.
#[derive(Clone)]
pub struct TokenSourceResolver {
    external: Arc<dyn ExternalConfigReader>,
    service_accounts: Arc<dyn ServiceAccountProvider>,
    clients: Arc<dyn ClientResolver>,
    credentials: Arc<dyn CredentialReader>,
    secrets: Arc<dyn SecretsOpener>,
    endpoints: OAuthEndpoints,
    refresh_timeout: Option<Duration>,
}

impl TokenSourceResolver {
    pub fn new(
        external: Arc<dyn ExternalConfigReader>,
        service_accounts: Arc<dyn ServiceAccountProvider>,
        clients: Arc<dyn ClientResolver>,
        credentials: Arc<dyn CredentialReader>,
        secrets: Arc<dyn SecretsOpener>,
    ) -> Self {
        Self {
            external,
            service_accounts,
            clients,
            credentials,
            secrets,
            endpoints: OAuthEndpoints::google(),
            refresh_timeout: None,
        }
    }

    /// Resolver wired to the files and keyring named by `config`.
    pub fn from_config(config: &GogConfig) -> Self {
        Self::new(
            Arc::new(FileExternalConfig::new(&config.external_token_path)),
            Arc::new(KeyFileServiceAccounts::with_default_exchange(&config.service_account_dir)),
            Arc::new(ConfiguredClients::from_config(config)),
            Arc::new(FileCredentialReader::new(&config.credentials_dir)),
            Arc::new(KeyringOpener::new(&config.keyring_service)),
        )
    }

    pub fn with_service_accounts(mut self, provider: Arc<dyn ServiceAccountProvider>) -> Self {
        self.service_accounts = provider;
        self
    }

    /// Override the OAuth endpoints used for refresh-token exchange.
    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Override the timeout bounding each refresh-token exchange.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Resolve a token source for `service` on behalf of `email`.
    pub async fn resolve(
        &self,
        service: Service,
        email: &str,
    ) -> Result<Arc<dyn TokenSource>, ResolveError> {
        self.resolve_with_scopes(service.as_str(), email, &service.scopes())
            .await
    }

    /// Resolve by free-form service label with explicit scopes.
    ///
    /// Labels that do not name a known service never match an external
    /// token but still resolve through the other backends.
    pub async fn resolve_with_scopes(
        &self,
        label: &str,
        email: &str,
        scopes: &[String],
    ) -> Result<Arc<dyn TokenSource>, ResolveError> {
        if let Some(config) = self.external.read()? {
            if let Some(token) = config.token_for_label(label) {
                tracing::debug!(service = label, "using external token");
                return Ok(Arc::new(StaticTokenSource::new(
                    token,
                    TokenSourceKind::External,
                )));
            }
        }

        if let Some(source) = self.service_accounts.token_source(email, scopes)? {
            return Ok(source);
        }

        let client = self
            .clients
            .resolve_client(email)
            .map_err(ResolveError::Client)?;
        let stored = self.stored_token(label, &client, email).await?;

        if !stored.access_token.is_empty() {
            tracing::debug!(service = label, email, client = %client, "using stored access token");
            return Ok(Arc::new(StaticTokenSource::new(
                stored.access_token.expose(),
                TokenSourceKind::StoredAccess,
            )));
        }

        tracing::debug!(service = label, email, client = %client, "using stored refresh token");
        self.refreshing_source(&client, stored)
    }

    async fn stored_token(
        &self,
        label: &str,
        client: &str,
        email: &str,
    ) -> Result<StoredToken, ResolveError> {
        let store = self.secrets.open().map_err(ResolveError::OpenStore)?;

        let auth_required = |cause| AuthRequiredError {
            service: label.to_string(),
            email: email.to_string(),
            client: client.to_string(),
            cause,
        };

        let stored = match store.get_token(client, email).await {
            Ok(stored) => stored,
            Err(cause) if cause.is_not_found() => return Err(auth_required(cause).into()),
            Err(source) => {
                return Err(ResolveError::Store {
                    email: email.to_string(),
                    source,
                });
            }
        };

        if !stored.is_usable() {
            return Err(auth_required(StoreError::InvalidInput {
                message: "stored token has neither an access token nor a refresh token"
                    .to_string(),
            })
            .into());
        }
        Ok(stored)
    }

    #[cfg(feature = "oauth")]
    fn refreshing_source(
        &self,
        client: &str,
        stored: StoredToken,
    ) -> Result<Arc<dyn TokenSource>, ResolveError> {
        let creds = self
            .credentials
            .read(client)
            .map_err(ResolveError::Credentials)?;

        let mut source = crate::oauth::RefreshingTokenSource::new(
            &self.endpoints,
            &creds.client_id,
            creds.client_secret.expose(),
            stored.refresh_token.clone(),
        )?;
        if let Some(timeout) = self.refresh_timeout {
            source = source.with_timeout(timeout);
        }
        Ok(Arc::new(source))
    }

    #[cfg(not(feature = "oauth"))]
    fn refreshing_source(
        &self,
        client: &str,
        _stored: StoredToken,
    ) -> Result<Arc<dyn TokenSource>, ResolveError> {
        self.credentials
            .read(client)
            .map_err(ResolveError::Credentials)?;
        Err(TokenError::Unavailable {
            message: "refresh tokens require the `oauth` feature".to_string(),
        }
        .into())
    }
}

impl std::fmt::Debug for TokenSourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSourceResolver")
            .field("endpoints", &self.endpoints)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ClientCredentials;
    use crate::external_config::{ExternalTokenConfig, NoExternalConfig};
    use crate::secrets::{FixedStoreOpener, SecretTokenStore, TokenStore};
    use crate::service_account::NoServiceAccounts;
    use crate::store::{MemoryStore, Secret, SecretStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct InlineExternal(&'static str);

    impl ExternalConfigReader for InlineExternal {
        fn read(&self) -> Result<Option<ExternalTokenConfig>, ConfigError> {
            Ok(Some(ExternalTokenConfig::parse(self.0)))
        }
    }

    #[derive(Default)]
    struct CountingCredentials {
        reads: AtomicU32,
    }

    impl CredentialReader for CountingCredentials {
        fn read(&self, _client: &str) -> Result<ClientCredentials, CredentialsError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(ClientCredentials {
                client_id: "client-id".to_string(),
                client_secret: Secret::new("client-secret"),
            })
        }
    }

    /// Opener that fails the test if the store is ever opened.
    struct UnreachableOpener;

    impl SecretsOpener for UnreachableOpener {
        fn open(&self) -> Result<Arc<dyn TokenStore>, StoreError> {
            panic!("secrets store must not be opened");
        }
    }

    fn resolver_with(
        external: Arc<dyn ExternalConfigReader>,
        store: Arc<dyn TokenStore>,
    ) -> (TokenSourceResolver, Arc<CountingCredentials>) {
        let credentials = Arc::new(CountingCredentials::default());
        let resolver = TokenSourceResolver::new(
            external,
            Arc::new(NoServiceAccounts),
            Arc::new(ConfiguredClients::default()),
            credentials.clone(),
            Arc::new(FixedStoreOpener::new(store)),
        );
        (resolver, credentials)
    }

    fn empty_store() -> Arc<dyn TokenStore> {
        Arc::new(SecretTokenStore::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_external_token_needs_no_store() {
        let resolver = TokenSourceResolver::new(
            Arc::new(InlineExternal("[gdrive]\ntoken=abc123\n")),
            Arc::new(NoServiceAccounts),
            Arc::new(ConfiguredClients::default()),
            Arc::new(CountingCredentials::default()),
            Arc::new(UnreachableOpener),
        );

        let source = resolver.resolve(Service::Drive, "anyone@example.com").await.unwrap();

        assert_eq!(source.kind(), TokenSourceKind::External);
        assert_eq!(source.token().await.unwrap().access_token.expose(), "abc123");
    }

    #[tokio::test]
    async fn test_external_section_for_other_service_is_ignored() {
        let (resolver, _) = resolver_with(
            Arc::new(InlineExternal("[gmail]\ntoken=mail-token\n")),
            empty_store(),
        );

        let err = resolver
            .resolve(Service::Calendar, "me@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::AuthRequired(_)));
    }

    #[tokio::test]
    async fn test_not_found_is_auth_required() {
        let (resolver, credentials) = resolver_with(Arc::new(NoExternalConfig), empty_store());

        let err = resolver
            .resolve(Service::Gmail, "me@example.com")
            .await
            .unwrap_err();

        match err {
            ResolveError::AuthRequired(e) => {
                assert_eq!(e.service, "gmail");
                assert_eq!(e.email, "me@example.com");
                assert_eq!(e.client, "default");
                assert!(e.cause.is_not_found());
            }
            other => panic!("expected AuthRequired, got {other:?}"),
        }
        assert_eq!(credentials.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_access_token_used_directly() {
        let store = Arc::new(SecretTokenStore::new(MemoryStore::new()));
        store
            .set_token(
                "default",
                "me@example.com",
                &StoredToken::refresh("r1").with_access_token("xyz"),
            )
            .await
            .unwrap();
        let (resolver, credentials) = resolver_with(Arc::new(NoExternalConfig), store);

        let source = resolver.resolve(Service::Gmail, "me@example.com").await.unwrap();

        assert_eq!(source.kind(), TokenSourceKind::StoredAccess);
        assert_eq!(source.token().await.unwrap().access_token.expose(), "xyz");
        assert_eq!(credentials.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_access_only_record_used_without_credentials() {
        let backend = MemoryStore::new();
        backend
            .set(
                &crate::secrets::token_key("default", "me@example.com"),
                &Secret::new(r#"{"access_token":"xyz"}"#),
            )
            .await
            .unwrap();
        let store: Arc<dyn TokenStore> = Arc::new(SecretTokenStore::new(backend));
        let (resolver, credentials) = resolver_with(Arc::new(NoExternalConfig), store);

        let source = resolver.resolve(Service::Drive, "me@example.com").await.unwrap();

        assert_eq!(source.kind(), TokenSourceKind::StoredAccess);
        assert_eq!(source.token().await.unwrap().access_token.expose(), "xyz");
        assert_eq!(credentials.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_token_reads_credentials() {
        let store = Arc::new(SecretTokenStore::new(MemoryStore::new()));
        store
            .set_token("default", "me@example.com", &StoredToken::refresh("r1"))
            .await
            .unwrap();
        let (resolver, credentials) = resolver_with(Arc::new(NoExternalConfig), store);

        let source = resolver.resolve(Service::Drive, "me@example.com").await.unwrap();

        assert_eq!(source.kind(), TokenSourceKind::StoredRefresh);
        assert_eq!(credentials.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_external_read_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let (resolver, _) = resolver_with(
            Arc::new(FileExternalConfig::new(dir.path())),
            empty_store(),
        );

        let err = resolver
            .resolve(Service::Gmail, "me@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Config(_)));
    }
}
