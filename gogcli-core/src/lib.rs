//! # gogcli Core
//!
//! Resilient access layer for the `gog` Google CLI.
//!
//! This crate provides:
//! - Token-source resolution across the external token config, service
//!   accounts and the secrets store
//! - A retry transport for 429 and 5xx responses, guarded by a circuit breaker
//! - A generic retry helper for calls returning typed results
//! - In-memory and (optionally) keyring-based token storage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gogcli_core::{ApiClient, CallContext, Service, TokenSourceResolver, load_config};
//!
//! async fn list_files(email: &str) -> Result<serde_json::Value, gogcli_core::GogError> {
//!     let config = load_config()?;
//!     let source = TokenSourceResolver::from_config(&config)
//!         .resolve(Service::Drive, email)
//!         .await?;
//!     let client = ApiClient::new(source, config.retry.to_retry_config())?;
//!     Ok(client
//!         .get_json(&CallContext::new(), "https://www.googleapis.com/drive/v3/files")
//!         .await?)
//! }
//! ```

pub mod api_error;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod external_config;
pub mod model;
pub mod provider;
pub mod resilience;
pub mod resolver;
pub mod secrets;
pub mod service_account;
pub mod store;
pub mod token;
pub mod transport;

#[cfg(feature = "oauth")]
pub mod oauth;

// Re-export commonly used types at crate root
pub use model::{
    Service,
    TokenSourceKind,
    UnknownService,
};

pub use store::{
    Secret,
    SecretStore,
    StoreError,
    MemoryStore,
    open_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use secrets::{
    StoredToken,
    TokenStore,
    SecretTokenStore,
    SecretsOpener,
    KeyringOpener,
    FixedStoreOpener,
    token_key,
    parse_token_key,
};

pub use token::{
    Token,
    TokenError,
    TokenSource,
    StaticTokenSource,
};

pub use config::{
    GogConfig,
    RetrySettings,
    ConfigError,
    load_config,
};

pub use external_config::{
    ExternalTokenConfig,
    ExternalConfigReader,
    FileExternalConfig,
    NoExternalConfig,
};

pub use credentials::{
    ClientCredentials,
    ClientResolver,
    ConfiguredClients,
    CredentialReader,
    FileCredentialReader,
    CredentialsError,
};

pub use service_account::{
    AssertionExchange,
    JwtBearerExchange,
    ServiceAccountProvider,
    KeyFileServiceAccounts,
    NoServiceAccounts,
    ServiceAccountError,
};

pub use resolver::{
    TokenSourceResolver,
    ResolveError,
};

pub use resilience::{
    CallContext,
    CircuitBreaker,
    CircuitState,
    ClassifyError,
    ContextError,
    RetryConfig,
    RetryError,
    with_retry,
};

pub use transport::{
    ApiRequest,
    RequestBody,
    RetryTransport,
    RoundTrip,
    TransportError,
};

pub use api_error::GoogleApiError;
pub use client::ApiClient;

pub use error::{
    AuthRequiredError,
    RateLimitError,
    CircuitBreakerError,
    GogError,
};

pub use provider::OAuthEndpoints;

#[cfg(feature = "oauth")]
pub use oauth::RefreshingTokenSource;
