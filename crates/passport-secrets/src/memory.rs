use std::collections::HashMap;
use std::sync::Mutex;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{KeyStore, KeyStoreError};

/// Keys held in process memory. Zeroized on removal and drop.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, String>>,
}

impl MemoryKeyStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, KeyStoreError> {
        self.keys
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("memory key store lock poisoned".into()))
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self, user_id: &str) -> Result<Option<SecretString>, KeyStoreError> {
        Ok(self
            .lock()?
            .get(user_id)
            .map(|k| SecretString::from(k.clone())))
    }

    fn store(&self, user_id: &str, key: &SecretString) -> Result<(), KeyStoreError> {
        if let Some(mut old) = self
            .lock()?
            .insert(user_id.to_string(), key.expose_secret().to_string())
        {
            old.zeroize();
        }
        Ok(())
    }

    fn store_if_absent(
        &self,
        user_id: &str,
        key: &SecretString,
    ) -> Result<SecretString, KeyStoreError> {
        let mut keys = self.lock()?;
        let winner = keys
            .entry(user_id.to_string())
            .or_insert_with(|| key.expose_secret().to_string());
        Ok(SecretString::from(winner.clone()))
    }

    fn remove(&self, user_id: &str) -> Result<(), KeyStoreError> {
        if let Some(mut old) = self.lock()?.remove(user_id) {
            old.zeroize();
        }
        Ok(())
    }
}

impl Drop for MemoryKeyStore {
    fn drop(&mut self) {
        if let Ok(keys) = self.keys.get_mut() {
            keys.values_mut().for_each(Zeroize::zeroize);
        }
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyStore")
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_load_remove() {
        let store = MemoryKeyStore::default();
        assert!(store.load("u").unwrap().is_none());

        store.store("u", &SecretString::from("aa")).unwrap();
        assert_eq!(store.load("u").unwrap().unwrap().expose_secret(), "aa");

        store.store("u", &SecretString::from("bb")).unwrap();
        assert_eq!(store.load("u").unwrap().unwrap().expose_secret(), "bb");

        store.remove("u").unwrap();
        assert!(store.load("u").unwrap().is_none());
        // removing twice is fine
        store.remove("u").unwrap();
    }

    #[test]
    fn test_store_if_absent_keeps_first() {
        let store = MemoryKeyStore::default();
        let first = store.store_if_absent("u", &SecretString::from("aa")).unwrap();
        let second = store.store_if_absent("u", &SecretString::from("bb")).unwrap();
        assert_eq!(first.expose_secret(), "aa");
        assert_eq!(second.expose_secret(), "aa");
        assert_eq!(store.load("u").unwrap().unwrap().expose_secret(), "aa");
    }
}
