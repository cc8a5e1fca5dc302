use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use passport_crypto::{LegacyEnvelopePolicy, MessageCipher};

use crate::error::{PassportError, PassportResult};

/// Top-level configuration (loaded from passport.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassportConfig {
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
    pub keys: KeysConfig,
}

impl PassportConfig {
    pub fn from_toml_str(content: &str) -> PassportResult<Self> {
        toml::from_str(content).map_err(|e| PassportError::Config(e.to_string()))
    }

    /// Read `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> PassportResult<Self> {
        match Self::load_if_present(path)? {
            Some(config) => Ok(config),
            None => {
                tracing::warn!("config file not found: {}  (using defaults)", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Read `path`, or `None` when it does not exist. Does not log, so it can
    /// run before a subscriber is installed.
    pub fn load_if_present(path: &Path) -> PassportResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::from_toml_str(&content)
            .map(Some)
            .map_err(|e| PassportError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> PassportResult<String> {
        toml::to_string_pretty(self).map_err(|e| PassportError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Message encryption settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Envelopes without an integrity tag: "allow" (default) or "reject"
    pub legacy_envelopes: LegacyEnvelopePolicy,
}

impl CryptoConfig {
    pub fn message_cipher(&self) -> MessageCipher {
        MessageCipher::new().with_legacy_policy(self.legacy_envelopes)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// JSON file of user id → hex key
    #[default]
    File,
    /// Platform keychain (macOS Keychain, Secret Service, Credential Manager)
    Keychain,
    /// Process memory only; keys vanish on exit
    Memory,
}

/// Per-user key storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub backend: KeyBackend,
    /// Key file for the "file" backend
    pub key_file: PathBuf,
    /// Keychain service name for the "keychain" backend
    pub service_name: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            backend: KeyBackend::File,
            key_file: PathBuf::from("~/.local/share/passport/keys.json"),
            service_name: "passport".into(),
        }
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}
