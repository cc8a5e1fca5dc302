//! Shared symmetric key: hex parsing and generation

use secrecy::SecretString;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::rng::RandomSource;
use crate::{KEY_HEX_LEN, KEY_SIZE};

/// A 256-bit AES/HMAC key parsed from its hex form. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse the external hex representation of a key.
    ///
    /// Surrounding whitespace is ignored. At least 64 hex characters are
    /// required; only the first 64 are used. Anything after them is dropped
    /// so that keys stored with trailing material keep decrypting old data.
    pub fn parse(hex_key: &str) -> CryptoResult<Self> {
        let trimmed = hex_key.trim();
        if trimmed.len() < KEY_HEX_LEN {
            return Err(CryptoError::InvalidKey(
                "Encryption key is too short".to_string(),
            ));
        }
        if trimmed.len() > KEY_HEX_LEN {
            tracing::debug!(
                extra = trimmed.len() - KEY_HEX_LEN,
                "ignoring key material beyond 64 hex characters"
            );
        }

        let head = trimmed
            .get(..KEY_HEX_LEN)
            .ok_or_else(|| CryptoError::InvalidKey("key is not hex".to_string()))?;

        let mut bytes = [0u8; KEY_SIZE];
        hex::decode_to_slice(head, &mut bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("key is not hex: {e}")))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase 64-character hex form.
    pub fn to_hex(&self) -> SecretString {
        SecretString::from(hex::encode(self.bytes))
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh key: 32 random bytes, hex-encoded.
pub fn generate_encryption_key(rng: &dyn RandomSource) -> CryptoResult<SecretString> {
    let mut bytes = [0u8; KEY_SIZE];
    rng.fill(&mut bytes)?;
    let key = EncryptionKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key.to_hex())
}
