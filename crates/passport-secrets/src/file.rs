//! Key file: a JSON object of user id → hex key.
//!
//! Writes replace the whole file through a sibling temp file and a rename, so
//! a crash mid-write leaves the previous contents intact. On Unix the file is
//! created with mode 0600.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{KeyStore, KeyStoreError};

#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, KeyStoreError> {
        let mut content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let parsed = serde_json::from_str(&content).map_err(|e| {
            KeyStoreError::Corrupt(format!("key file {}: {e}", self.path.display()))
        });
        content.zeroize();
        parsed
    }

    fn write_all(&self, keys: &BTreeMap<String, String>) -> Result<(), KeyStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_string_pretty(keys)
            .map_err(|e| KeyStoreError::Corrupt(format!("key file serialization: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        let result = write_private(&tmp, json.as_bytes())
            .and_then(|()| fs::rename(&tmp, &self.path));
        json.zeroize();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read, change and rewrite the file under the store lock. `f` returns
    /// whether the map changed; unchanged maps are not rewritten.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (bool, T),
    ) -> Result<T, KeyStoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| KeyStoreError::Unavailable("key file lock poisoned".into()))?;
        let mut keys = self.read_all()?;
        let (changed, out) = f(&mut keys);
        let result = if changed { self.write_all(&keys) } else { Ok(()) };
        keys.values_mut().for_each(Zeroize::zeroize);
        result.map(|()| out)
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

impl KeyStore for FileKeyStore {
    fn load(&self, user_id: &str) -> Result<Option<SecretString>, KeyStoreError> {
        let mut keys = self.read_all()?;
        let found = keys.remove(user_id).map(SecretString::from);
        keys.values_mut().for_each(Zeroize::zeroize);
        Ok(found)
    }

    fn store(&self, user_id: &str, key: &SecretString) -> Result<(), KeyStoreError> {
        self.modify(|keys| {
            if let Some(mut old) =
                keys.insert(user_id.to_string(), key.expose_secret().to_string())
            {
                old.zeroize();
            }
            (true, ())
        })?;
        tracing::debug!(user = user_id, path = %self.path.display(), "stored key in key file");
        Ok(())
    }

    fn store_if_absent(
        &self,
        user_id: &str,
        key: &SecretString,
    ) -> Result<SecretString, KeyStoreError> {
        self.modify(|keys| match keys.get(user_id) {
            Some(existing) => (false, SecretString::from(existing.clone())),
            None => {
                keys.insert(user_id.to_string(), key.expose_secret().to_string());
                (true, key.clone())
            }
        })
    }

    fn remove(&self, user_id: &str) -> Result<(), KeyStoreError> {
        self.modify(|keys| match keys.remove(user_id) {
            Some(mut old) => {
                old.zeroize();
                (true, ())
            }
            None => (false, ()),
        })
    }
}
