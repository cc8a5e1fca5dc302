//! passport-secrets: per-user encryption key storage
//!
//! Every user has one 256-bit message key, stored as 64 hex characters under
//! their user id. Backends:
//!   - `keychain`: platform keychain via the `keyring` crate
//!   - `file`:     JSON map in a 0600 file
//!   - `memory`:   process-local, for tests and throwaway sessions

pub mod file;
pub mod keychain;
pub mod memory;

pub use file::FileKeyStore;
pub use keychain::KeychainKeyStore;
pub use memory::MemoryKeyStore;

use passport_core::config::{expand_tilde, KeyBackend, KeysConfig};
use passport_core::PassportError;
use passport_crypto::{generate_encryption_key, CryptoError, EncryptionKey, OsRandom, RandomSource};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    #[error("key generation failed: {0}")]
    Generation(#[from] CryptoError),

    #[error("stored key is unusable: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<KeyStoreError> for PassportError {
    fn from(e: KeyStoreError) -> Self {
        PassportError::KeyStore(Box::new(e))
    }
}

/// Key-value store of hex keys by user id.
pub trait KeyStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<SecretString>, KeyStoreError>;
    fn store(&self, user_id: &str, key: &SecretString) -> Result<(), KeyStoreError>;
    /// Store `key` unless the user already has one, atomically, and return
    /// whichever key the store now holds.
    fn store_if_absent(
        &self,
        user_id: &str,
        key: &SecretString,
    ) -> Result<SecretString, KeyStoreError>;
    fn remove(&self, user_id: &str) -> Result<(), KeyStoreError>;
}

/// Return the stored key for `user_id`, generating and persisting one if absent.
pub fn get_or_create_encryption_key(
    store: &dyn KeyStore,
    user_id: &str,
) -> Result<SecretString, KeyStoreError> {
    get_or_create_with(store, user_id, &OsRandom)
}

pub fn get_or_create_with(
    store: &dyn KeyStore,
    user_id: &str,
    rng: &dyn RandomSource,
) -> Result<SecretString, KeyStoreError> {
    if user_id.is_empty() {
        return Err(KeyStoreError::Unavailable("user id is required".into()));
    }

    if let Some(existing) = store.load(user_id)? {
        check_stored(user_id, &existing)?;
        tracing::debug!(user = user_id, "using stored encryption key");
        return Ok(existing);
    }

    let key = generate_encryption_key(rng)?;
    let held = store.store_if_absent(user_id, &key)?;
    if held.expose_secret() == key.expose_secret() {
        tracing::debug!(user = user_id, "created encryption key");
    } else {
        check_stored(user_id, &held)?;
        tracing::debug!(user = user_id, "key created concurrently, using stored key");
    }
    Ok(held)
}

fn check_stored(user_id: &str, key: &SecretString) -> Result<(), KeyStoreError> {
    EncryptionKey::parse(key.expose_secret())
        .map(drop)
        .map_err(|e| KeyStoreError::Corrupt(format!("key for '{user_id}': {e}")))
}

/// Build the backend selected in config. A keychain that cannot be reached
/// falls back to the key file.
pub fn open_key_store(config: &KeysConfig) -> Box<dyn KeyStore> {
    let keychain_available = match config.backend {
        KeyBackend::Keychain => KeychainKeyStore::new(&config.service_name).is_available(),
        _ => false,
    };
    select_key_store(config, keychain_available)
}

fn select_key_store(config: &KeysConfig, keychain_available: bool) -> Box<dyn KeyStore> {
    let file_store =
        || -> Box<dyn KeyStore> { Box::new(FileKeyStore::new(expand_tilde(&config.key_file))) };
    match config.backend {
        KeyBackend::File => file_store(),
        KeyBackend::Keychain if keychain_available => {
            Box::new(KeychainKeyStore::new(&config.service_name))
        }
        KeyBackend::Keychain => {
            tracing::warn!(
                path = %config.key_file.display(),
                "platform keychain unavailable, using key file"
            );
            file_store()
        }
        KeyBackend::Memory => Box::new(MemoryKeyStore::default()),
    }
}
