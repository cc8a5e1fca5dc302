use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failure kinds of the message encryption layer.
///
/// None of these are retryable: the caller either fixes its input or the data
/// is treated as tampered with.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A required input was empty or missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The key material could not be used as an AES-256 key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Tag mismatch, undecryptable ciphertext, or an empty plaintext.
    #[error("integrity check failed: {0}")]
    Integrity(&'static str),

    /// The random source or a cipher/digest primitive failed unexpectedly.
    #[error("crypto primitive failure: {0}")]
    Primitive(String),
}

impl CryptoError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, CryptoError::Integrity(_))
    }
}
