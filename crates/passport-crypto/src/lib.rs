//! passport-crypto: direct-message encryption for Passport
//!
//! Scheme: AES-256-CBC with PKCS#7 padding, authenticated by HMAC-SHA256
//! (encrypt-then-MAC) under a single shared 256-bit key.
//!
//! ```text
//! hex key (>= 64 chars) ── first 64 ──► EncryptionKey (32 bytes)
//!                                           │
//!   plaintext ── AES-256-CBC(key, random 16-byte IV) ──► ciphertext
//!                                           │
//!   tag = HMAC-SHA256(key, hex(iv) || hex(ciphertext))
//!                                           │
//!   EncryptedEnvelope { text, iv, salt: "", tag, algorithm: "AES-256-CBC-HMAC" }
//! ```
//!
//! Nothing here touches storage or the network. Key persistence lives in
//! `passport-secrets`.

pub mod envelope;
pub mod error;
pub mod hash;
pub mod keys;
pub mod messages;
pub mod rng;

pub use envelope::{
    decrypt_message, encrypt_message, EncryptedEnvelope, LegacyEnvelopePolicy, MessageCipher,
};
pub use error::{CryptoError, CryptoResult};
pub use hash::{hash_string, verify_message_integrity};
pub use keys::{generate_encryption_key, EncryptionKey};
pub use messages::{
    bulk_decrypt_messages, bulk_encrypt_messages, is_encrypted_envelope, ChatMessage,
};
pub use rng::{OsRandom, RandomSource};

/// Size of the AES/HMAC key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Hex characters of key material actually used
pub const KEY_HEX_LEN: usize = KEY_SIZE * 2;

/// Size of a CBC initialization vector (128-bit)
pub const IV_SIZE: usize = 16;

/// Size of an HMAC-SHA256 tag
pub const TAG_SIZE: usize = 32;

/// Algorithm identifier written into every envelope
pub const ALGORITHM: &str = "AES-256-CBC-HMAC";
