//! Secret storage for account passwords.
//!
//! Passwords are stored only through a [`CredentialStore`], keyed by
//! account id. [`KeyringStore`] uses the platform's native storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use tracing::{debug, warn};

/// Service name used for keyring entries.
pub const SERVICE_NAME: &str = "mailkeep";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Nothing is stored under the key.
    #[error("No credential stored for {0}")]
    NotFound(String),

    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Storage for secrets keyed by account id.
pub trait CredentialStore: Send + Sync {
    /// Stores a secret, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn save(&self, secret: &str, key: &str) -> CredentialResult<()>;

    /// Reads a secret.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored under `key`.
    fn retrieve(&self, key: &str) -> CredentialResult<String>;

    /// Replaces an existing secret.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored under `key`.
    fn update(&self, secret: &str, key: &str) -> CredentialResult<()>;

    /// Removes a secret. Removing a missing secret succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn delete(&self, key: &str) -> CredentialResult<()>;
}

/// Credential store backed by the system keyring.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Creates a store using a custom keyring service name.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> CredentialResult<Entry> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl CredentialStore for KeyringStore {
    fn save(&self, secret: &str, key: &str) -> CredentialResult<()> {
        self.entry(key)?.set_password(secret)?;
        debug!("Stored credential for {key}");
        Ok(())
    }

    fn retrieve(&self, key: &str) -> CredentialResult<String> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => {
                debug!("No credential found for {key}");
                Err(CredentialError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, secret: &str, key: &str) -> CredentialResult<()> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(_) => {
                entry.set_password(secret)?;
                debug!("Updated credential for {key}");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Err(CredentialError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> CredentialResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => debug!("Deleted credential for {key}"),
            Err(keyring::Error::NoEntry) => debug!("No credential to delete for {key}"),
            Err(e) => {
                warn!("Failed to delete credential for {key}: {e}");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Credential store that keeps secrets in process memory.
///
/// Nothing is written anywhere; secrets are gone when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_secrets<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut secrets)
    }
}

impl CredentialStore for MemoryStore {
    fn save(&self, secret: &str, key: &str) -> CredentialResult<()> {
        self.with_secrets(|secrets| secrets.insert(key.to_string(), secret.to_string()));
        Ok(())
    }

    fn retrieve(&self, key: &str) -> CredentialResult<String> {
        self.with_secrets(|secrets| secrets.get(key).cloned())
            .ok_or_else(|| CredentialError::NotFound(key.to_string()))
    }

    fn update(&self, secret: &str, key: &str) -> CredentialResult<()> {
        self.with_secrets(|secrets| {
            secrets.get_mut(key).map(|stored| {
                *stored = secret.to_string();
            })
        })
        .ok_or_else(|| CredentialError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> CredentialResult<()> {
        self.with_secrets(|secrets| secrets.remove(key));
        Ok(())
    }
}
