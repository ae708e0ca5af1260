//! OS keyring-backed secret storage implementation.

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// OS keyring-backed secret store.
///
/// Uses the platform's native keyring service (macOS Keychain, the kernel
/// keyutils keyring on Linux, Credential Manager on Windows). Every key becomes one
/// keyring entry under the store's service name, with the key as the user.
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Returns an error if the keyring backend is not available on this platform.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        match Entry::new(service_name, "availability_check") {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StoreError::KeyringUnavailable {
                message: format!("keyring backend not available: {}", e),
            }),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let entry = self.entry(key)?;

        match entry.get_password() {
            Ok(password) => Ok(Some(Secret::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::BackendError {
                message: format!("ambiguous keyring entry for key: {}", key),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests avoid touching real keyring entries; platforms without a
    // keyring report KeyringUnavailable and are accepted.

    #[test]
    fn test_keyring_store_creation() {
        match KeyringStore::try_new("gogcli-test") {
            Ok(store) => assert_eq!(store.service_name, "gogcli-test"),
            Err(StoreError::KeyringUnavailable { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_keyring_round_trip() {
        let Ok(store) = KeyringStore::try_new("gogcli-test") else {
            return;
        };
        let key = format!("token:default:roundtrip-{}@example.com", std::process::id());

        // Sandboxes without a usable keyring reject the write; nothing to check there.
        if store.set(&key, &Secret::new("v1")).await.is_err() {
            return;
        }

        let read_back = store.get(&key).await.unwrap();
        let fresh = KeyringStore::try_new("gogcli-test").unwrap().get(&key).await.unwrap();
        store.delete(&key).await.unwrap();

        assert_eq!(read_back.as_ref().map(Secret::expose), Some("v1"));
        assert_eq!(fresh.as_ref().map(Secret::expose), Some("v1"));
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
