//! OAuth client identity: which client an account uses, and that client's
//! id and secret.
//!
//! Client files are the JSON Google Cloud Console hands out, stored as
//! `credentials.json` for the default client and `credentials-<client>.json`
//! for named ones.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::GogConfig;
use crate::secrets::DEFAULT_CLIENT;
use crate::store::Secret;

/// Error type for client resolution and credential files.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no OAuth client credentials for client {client:?} at {path}")]
    NotFound { client: String, path: PathBuf },

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
        source: serde_json::Error,
    },

    #[error("{path} has no {field}")]
    Missing { path: PathBuf, field: &'static str },

    #[error("cannot resolve OAuth client: {message}")]
    UnresolvedClient { message: String },
}

/// OAuth client id and secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret,
}

/// Maps an account to the name of the OAuth client it was authorized with.
pub trait ClientResolver: Send + Sync {
    fn resolve_client(&self, email: &str) -> Result<String, CredentialsError>;
}

/// Client resolution from the `account_clients` table of [`GogConfig`].
#[derive(Debug, Clone)]
pub struct ConfiguredClients {
    default_client: String,
    account_clients: HashMap<String, String>,
}

impl ConfiguredClients {
    pub fn new(default_client: impl Into<String>) -> Self {
        Self {
            default_client: default_client.into(),
            account_clients: HashMap::new(),
        }
    }

    pub fn from_config(config: &GogConfig) -> Self {
        let account_clients = config
            .account_clients
            .iter()
            .map(|(email, client)| (email.trim().to_lowercase(), client.clone()))
            .collect();
        Self {
            default_client: config.default_client.clone(),
            account_clients,
        }
    }

    /// Map `email` to `client`.
    pub fn with_account(mut self, email: &str, client: impl Into<String>) -> Self {
        self.account_clients
            .insert(email.trim().to_lowercase(), client.into());
        self
    }
}

impl Default for ConfiguredClients {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT)
    }
}

impl ClientResolver for ConfiguredClients {
    fn resolve_client(&self, email: &str) -> Result<String, CredentialsError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(CredentialsError::UnresolvedClient {
                message: "missing account email".to_string(),
            });
        }

        let client = self
            .account_clients
            .get(&email)
            .unwrap_or(&self.default_client)
            .trim();
        if client.is_empty() {
            return Ok(DEFAULT_CLIENT.to_string());
        }
        Ok(client.to_string())
    }
}

/// Reads OAuth client credentials by client name.
pub trait CredentialReader: Send + Sync {
    fn read(&self, client: &str) -> Result<ClientCredentials, CredentialsError>;
}

/// Reads client JSON files from a directory.
#[derive(Debug, Clone)]
pub struct FileCredentialReader {
    dir: PathBuf,
}

impl FileCredentialReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the credentials file for `client`.
    pub fn path_for(&self, client: &str) -> PathBuf {
        if client.is_empty() || client == DEFAULT_CLIENT {
            self.dir.join("credentials.json")
        } else {
            self.dir.join(format!("credentials-{client}.json"))
        }
    }
}

impl CredentialReader for FileCredentialReader {
    fn read(&self, client: &str) -> Result<ClientCredentials, CredentialsError> {
        let path = self.path_for(client);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CredentialsError::NotFound {
                    client: client.to_string(),
                    path,
                });
            }
            Err(source) => return Err(CredentialsError::Read { path, source }),
        };
        parse_client_credentials(&content, &path)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ClientSection {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
    #[serde(flatten)]
    flat: ClientSection,
}

/// Parse a Google OAuth client file.
///
/// Accepts the `installed` and `web` layouts from the Cloud Console as well
/// as a flat `{client_id, client_secret}` object.
pub fn parse_client_credentials(
    content: &str,
    path: &Path,
) -> Result<ClientCredentials, CredentialsError> {
    let file: CredentialsFile =
        serde_json::from_str(content).map_err(|source| CredentialsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let section = file.installed.or(file.web).unwrap_or(file.flat);
    if section.client_id.trim().is_empty() {
        return Err(CredentialsError::Missing {
            path: path.to_path_buf(),
            field: "client_id",
        });
    }

    Ok(ClientCredentials {
        client_id: section.client_id.trim().to_string(),
        client_secret: Secret::new(section.client_secret),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_clients() {
        let clients = ConfiguredClients::new("work").with_account("Me@Example.com", "personal");

        assert_eq!(clients.resolve_client("me@example.com").unwrap(), "personal");
        assert_eq!(clients.resolve_client(" ME@example.com ").unwrap(), "personal");
        assert_eq!(clients.resolve_client("other@example.com").unwrap(), "work");
        assert!(clients.resolve_client("  ").is_err());
    }

    #[test]
    fn test_blank_default_client_falls_back() {
        let clients = ConfiguredClients::new("");
        assert_eq!(clients.resolve_client("me@example.com").unwrap(), DEFAULT_CLIENT);
    }

    #[test]
    fn test_path_for() {
        let reader = FileCredentialReader::new("/etc/gog");
        assert_eq!(reader.path_for("default"), Path::new("/etc/gog/credentials.json"));
        assert_eq!(reader.path_for("work"), Path::new("/etc/gog/credentials-work.json"));
    }

    #[test]
    fn test_parse_installed_and_web_and_flat() {
        let path = Path::new("credentials.json");

        let installed = parse_client_credentials(
            r#"{"installed":{"client_id":"id-1","client_secret":"s-1","redirect_uris":["http://localhost"]}}"#,
            path,
        )
        .unwrap();
        assert_eq!(installed.client_id, "id-1");
        assert_eq!(installed.client_secret.expose(), "s-1");

        let web = parse_client_credentials(r#"{"web":{"client_id":"id-2"}}"#, path).unwrap();
        assert_eq!(web.client_id, "id-2");
        assert!(web.client_secret.is_empty());

        let flat =
            parse_client_credentials(r#"{"client_id":"id-3","client_secret":"s-3"}"#, path).unwrap();
        assert_eq!(flat.client_id, "id-3");
    }

    #[test]
    fn test_parse_missing_client_id() {
        let err = parse_client_credentials(r#"{"installed":{}}"#, Path::new("c.json")).unwrap_err();
        assert!(matches!(err, CredentialsError::Missing { field: "client_id", .. }));
    }

    #[test]
    fn test_read_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let reader = FileCredentialReader::new(dir.path());

        let err = reader.read("work").unwrap_err();
        match err {
            CredentialsError::NotFound { client, path } => {
                assert_eq!(client, "work");
                assert!(path.ends_with("credentials-work.json"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("credentials.json"),
            r#"{"installed":{"client_id":"abc.apps.googleusercontent.com","client_secret":"shh"}}"#,
        )
        .unwrap();

        let creds = FileCredentialReader::new(dir.path()).read(DEFAULT_CLIENT).unwrap();
        assert_eq!(creds.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(creds.client_secret.expose(), "shh");
    }
}
