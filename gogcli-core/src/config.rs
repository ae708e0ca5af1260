//! Configuration for the access layer.
//!
//! Loaded from `config.toml` in the platform config directory (or the path
//! in `GOG_CONFIG`). Every field has a default, so a missing file is fine.

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{CircuitBreaker, RetryConfig};
use crate::secrets::DEFAULT_CLIENT;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "GOG_CONFIG";

/// File name of the external token config in the home directory.
pub const EXTERNAL_TOKEN_FILE: &str = ".manus-gogcli.conf";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("could not determine the home directory")]
    NoHomeDir,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GogConfig {
    /// OAuth client name for accounts without an explicit mapping.
    pub default_client: String,

    /// Account email to OAuth client name.
    pub account_clients: HashMap<String, String>,

    /// Path of the external token config file.
    pub external_token_path: PathBuf,

    /// Directory holding `credentials.json` / `credentials-<client>.json`.
    pub credentials_dir: PathBuf,

    /// Directory holding `sa-<email>.json` service-account keys.
    pub service_account_dir: PathBuf,

    /// Keyring namespace for stored tokens.
    pub keyring_service: String,

    pub retry: RetrySettings,

    /// Path the configuration was loaded from.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for GogConfig {
    fn default() -> Self {
        let config_dir = project_dirs()
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".gogcli"));
        let external_token_path = BaseDirs::new()
            .map(|d| d.home_dir().join(EXTERNAL_TOKEN_FILE))
            .unwrap_or_else(|| PathBuf::from(EXTERNAL_TOKEN_FILE));

        Self {
            default_client: DEFAULT_CLIENT.to_string(),
            account_clients: HashMap::new(),
            external_token_path,
            credentials_dir: config_dir.clone(),
            service_account_dir: config_dir.join("service-accounts"),
            keyring_service: "gogcli".to_string(),
            retry: RetrySettings::default(),
            config_path: PathBuf::new(),
        }
    }
}

/// Retry and circuit-breaker tuning, in config-file friendly units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_rate_limit_retries: u32,
    pub max_5xx_retries: u32,
    pub base_delay_ms: u64,
    pub server_error_delay_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            max_5xx_retries: 1,
            base_delay_ms: 1000,
            server_error_delay_ms: 1000,
            breaker_threshold: 5,
            breaker_cooldown_secs: 30,
        }
    }
}

impl RetrySettings {
    /// Build a retry config with a fresh circuit breaker.
    pub fn to_retry_config(&self) -> RetryConfig {
        let breaker = CircuitBreaker::new(
            self.breaker_threshold,
            Duration::from_secs(self.breaker_cooldown_secs),
        );
        RetryConfig {
            max_rate_limit_retries: self.max_rate_limit_retries,
            max_5xx_retries: self.max_5xx_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            server_error_delay: Duration::from_millis(self.server_error_delay_ms),
            circuit_breaker: Some(std::sync::Arc::new(breaker)),
        }
    }
}

impl GogConfig {
    /// Parse a config file. Returns defaults if the file does not exist.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };

        config.config_path = path.to_path_buf();
        Ok(config)
    }
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("gogcli.toml"))
}

/// Load configuration from the default location or fall back to defaults.
pub fn load_config() -> Result<GogConfig, ConfigError> {
    GogConfig::from_path(&default_config_path())
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "steipete", "gogcli")
}
