//! Platform keychain storage for per-user message keys.
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS/iOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)

use std::sync::Mutex;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{KeyStore, KeyStoreError};

const ACCOUNT_PREFIX: &str = "encryption-key:";

/// The keychain has no compare-and-set, so creation is serialized within the
/// process only.
#[derive(Debug)]
pub struct KeychainKeyStore {
    service: String,
    create_lock: Mutex<()>,
}

impl KeychainKeyStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            create_lock: Mutex::new(()),
        }
    }

    /// Keychain account name for a user's key.
    pub fn account_name(user_id: &str) -> String {
        format!("{ACCOUNT_PREFIX}{user_id}")
    }

    /// Check if the platform keychain can be reached.
    pub fn is_available(&self) -> bool {
        keyring::Entry::new(&self.service, "__passport_check__").is_ok()
    }

    fn entry(&self, user_id: &str) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, &Self::account_name(user_id))
            .map_err(|e| KeyStoreError::Unavailable(format!("keychain entry creation: {e}")))
    }
}

impl KeyStore for KeychainKeyStore {
    fn load(&self, user_id: &str) -> Result<Option<SecretString>, KeyStoreError> {
        match self.entry(user_id)?.get_password() {
            Ok(mut password) => {
                let secret = SecretString::from(password.clone());
                password.zeroize();
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyStoreError::Unavailable(format!(
                "keychain get for '{user_id}': {e}"
            ))),
        }
    }

    fn store(&self, user_id: &str, key: &SecretString) -> Result<(), KeyStoreError> {
        self.entry(user_id)?
            .set_password(key.expose_secret())
            .map_err(|e| {
                KeyStoreError::Unavailable(format!("keychain store for '{user_id}': {e}"))
            })?;
        tracing::debug!(user = user_id, "stored key in platform keychain");
        Ok(())
    }

    fn store_if_absent(
        &self,
        user_id: &str,
        key: &SecretString,
    ) -> Result<SecretString, KeyStoreError> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("keychain lock poisoned".into()))?;
        if let Some(existing) = self.load(user_id)? {
            return Ok(existing);
        }
        self.store(user_id, key)?;
        // another process may have written between our load and store
        Ok(self.load(user_id)?.unwrap_or_else(|| key.clone()))
    }

    fn remove(&self, user_id: &str) -> Result<(), KeyStoreError> {
        match self.entry(user_id)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(user = user_id, "deleted key from platform keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()), // already deleted
            Err(e) => Err(KeyStoreError::Unavailable(format!(
                "keychain delete for '{user_id}': {e}"
            ))),
        }
    }
}
