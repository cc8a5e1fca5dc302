use thiserror::Error;

pub type PassportResult<T> = Result<T, PassportError>;

#[derive(Debug, Error)]
pub enum PassportError {
    #[error("crypto error: {0}")]
    Crypto(#[from] passport_crypto::CryptoError),

    /// Raised by the key store backends in `passport-secrets`
    #[error("key store error: {0}")]
    KeyStore(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
