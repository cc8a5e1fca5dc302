//! AES-256-CBC message envelopes authenticated with HMAC-SHA256
//!
//! Envelope (JSON):
//! ```text
//! {
//!   "text": hex(AES-256-CBC/PKCS#7(plaintext, key, iv)),
//!   "iv":   hex(16 random bytes),
//!   "salt": "",
//!   "tag":  hex(HMAC-SHA256(key, iv_hex || text_hex)),
//!   "algorithm": "AES-256-CBC-HMAC"
//! }
//! ```
//!
//! CBC gives no integrity of its own, so the tag is checked before any
//! decryption happens. Envelopes written before tags were introduced have no
//! `tag` field; whether those are still accepted is a [`LegacyEnvelopePolicy`].

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::EncryptionKey;
use crate::rng::{OsRandom, RandomSource};
use crate::{ALGORITHM, IV_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const DECRYPTION_FAILED: &str = "Decryption failed";

/// Encrypted form of a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Hex ciphertext
    pub text: String,
    /// Hex IV (16 bytes)
    pub iv: String,
    /// Reserved for a future key-derivation scheme; always empty today
    #[serde(default)]
    pub salt: String,
    /// Hex HMAC-SHA256 tag; absent on legacy envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

fn default_algorithm() -> String {
    ALGORITHM.to_string()
}

impl EncryptedEnvelope {
    /// The tag to verify, if any. An empty tag counts as absent.
    fn present_tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|t| !t.is_empty())
    }
}

/// What to do with an envelope that carries no tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyEnvelopePolicy {
    /// Decrypt without integrity verification, logging a warning.
    #[default]
    Allow,
    /// Fail with an integrity error.
    Reject,
}

/// Stateless encrypt/decrypt service over an injectable random source.
#[derive(Debug, Clone)]
pub struct MessageCipher<R = OsRandom> {
    rng: R,
    legacy: LegacyEnvelopePolicy,
}

impl Default for MessageCipher<OsRandom> {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCipher<OsRandom> {
    pub fn new() -> Self {
        Self::with_random(OsRandom)
    }
}

impl<R: RandomSource> MessageCipher<R> {
    pub fn with_random(rng: R) -> Self {
        Self {
            rng,
            legacy: LegacyEnvelopePolicy::default(),
        }
    }

    pub fn with_legacy_policy(mut self, policy: LegacyEnvelopePolicy) -> Self {
        self.legacy = policy;
        self
    }

    pub fn legacy_policy(&self) -> LegacyEnvelopePolicy {
        self.legacy
    }

    /// Encrypt UTF-8 text under a hex key.
    pub fn encrypt(&self, plaintext: &str, key: &str) -> CryptoResult<EncryptedEnvelope> {
        if plaintext.is_empty() || key.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "plaintext and key are required",
            ));
        }
        let key = EncryptionKey::parse(key)?;
        self.encrypt_with_key(plaintext, &key)
    }

    /// Encrypt with an already parsed key. `plaintext` must be non-empty.
    pub fn encrypt_with_key(
        &self,
        plaintext: &str,
        key: &EncryptionKey,
    ) -> CryptoResult<EncryptedEnvelope> {
        if plaintext.is_empty() {
            return Err(CryptoError::InvalidArgument("plaintext is required"));
        }

        let mut iv = [0u8; IV_SIZE];
        self.rng.fill(&mut iv)?;

        let ciphertext = aes_cbc_encrypt(key.as_bytes(), &iv, plaintext.as_bytes());
        let iv_hex = hex::encode(iv);
        let text = hex::encode(ciphertext);
        let tag = compute_tag(key, &iv_hex, &text)?;

        Ok(EncryptedEnvelope {
            text,
            iv: iv_hex,
            salt: String::new(),
            tag: Some(tag),
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Verify and decrypt an envelope under a hex key.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope, key: &str) -> CryptoResult<String> {
        if envelope.text.is_empty() || key.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "ciphertext and key are required",
            ));
        }
        let key = EncryptionKey::parse(key)?;
        self.decrypt_with_key(envelope, &key)
    }

    pub fn decrypt_with_key(
        &self,
        envelope: &EncryptedEnvelope,
        key: &EncryptionKey,
    ) -> CryptoResult<String> {
        if envelope.text.is_empty() {
            return Err(CryptoError::InvalidArgument("ciphertext is required"));
        }

        match envelope.present_tag() {
            Some(tag) => {
                let expected = compute_tag(key, &envelope.iv, &envelope.text)?;
                if !constant_time_eq(&expected, tag) {
                    tracing::warn!("message tag mismatch");
                    return Err(CryptoError::Integrity(DECRYPTION_FAILED));
                }
            }
            None => match self.legacy {
                LegacyEnvelopePolicy::Allow => {
                    tracing::warn!(
                        algorithm = %envelope.algorithm,
                        "decrypting legacy envelope without integrity tag"
                    );
                }
                LegacyEnvelopePolicy::Reject => {
                    tracing::warn!("rejecting legacy envelope without integrity tag");
                    return Err(CryptoError::Integrity("envelope has no integrity tag"));
                }
            },
        }

        let iv = hex::decode(&envelope.iv).map_err(|_| CryptoError::Integrity(DECRYPTION_FAILED))?;
        let ciphertext =
            hex::decode(&envelope.text).map_err(|_| CryptoError::Integrity(DECRYPTION_FAILED))?;

        let plaintext = aes_cbc_decrypt(key.as_bytes(), &iv, &ciphertext)?;
        let plaintext =
            String::from_utf8(plaintext).map_err(|_| CryptoError::Integrity(DECRYPTION_FAILED))?;

        if plaintext.is_empty() {
            return Err(CryptoError::Integrity(DECRYPTION_FAILED));
        }
        Ok(plaintext)
    }
}

/// Encrypt with a fresh IV from the OS random source.
pub fn encrypt_message(plaintext: &str, key: &str) -> CryptoResult<EncryptedEnvelope> {
    MessageCipher::new().encrypt(plaintext, key)
}

/// Decrypt, accepting untagged legacy envelopes.
pub fn decrypt_message(envelope: &EncryptedEnvelope, key: &str) -> CryptoResult<String> {
    MessageCipher::new().decrypt(envelope, key)
}

fn aes_cbc_encrypt(key: &[u8; 32], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

fn aes_cbc_decrypt(key: &[u8; 32], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| CryptoError::Integrity(DECRYPTION_FAILED))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Integrity(DECRYPTION_FAILED))
}

/// HMAC-SHA256 over the hex IV followed by the hex ciphertext.
fn compute_tag(key: &EncryptionKey, iv_hex: &str, text_hex: &str) -> CryptoResult<String> {
    hmac_hex(key.as_bytes(), &[iv_hex.as_bytes(), text_hex.as_bytes()])
}

fn hmac_hex(key: &[u8], parts: &[&[u8]]) -> CryptoResult<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::Primitive(format!("HMAC init: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Length check, then a comparison that touches every byte.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{BrokenRandom, FixedRandom};
    use proptest::prelude::*;

    const KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
    const OTHER_KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn flip_hex(s: &str, at: usize) -> String {
        let mut chars: Vec<char> = s.chars().collect();
        chars[at] = if chars[at] == '0' { '1' } else { '0' };
        chars.into_iter().collect()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let env = encrypt_message("hello from Lisbon", KEY).unwrap();
        assert_eq!(decrypt_message(&env, KEY).unwrap(), "hello from Lisbon");
    }

    #[test]
    fn test_unicode_roundtrip() {
        let text = "passport stamp: 東京 🗼 ok";
        let env = encrypt_message(text, KEY).unwrap();
        assert_eq!(decrypt_message(&env, KEY).unwrap(), text);
    }

    #[test]
    fn test_envelope_shape() {
        let env = encrypt_message("shape", KEY).unwrap();
        assert_eq!(env.iv.len(), 32);
        assert_eq!(env.tag.as_deref().map(str::len), Some(64));
        assert_eq!(env.salt, "");
        assert_eq!(env.algorithm, "AES-256-CBC-HMAC");
        // one full block for 5 bytes of plaintext
        assert_eq!(env.text.len(), 32);
    }

    #[test]
    fn test_block_aligned_plaintext_gets_padding_block() {
        let env = encrypt_message("0123456789abcdef", KEY).unwrap();
        assert_eq!(env.text.len(), 64);
    }

    #[test]
    fn test_nist_cbc_vector_first_block() {
        // NIST SP 800-38A F.2.5, CBC-AES256 encrypt, block 1
        let key: [u8; 32] = hex::decode(KEY).unwrap().try_into().unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let ct = aes_cbc_encrypt(&key, &iv, &pt);
        assert_eq!(ct.len(), 32);
        assert_eq!(hex::encode(&ct[..16]), "f58c4c04d6e5f1ba779eabfb5f7bfbd6");
        assert_eq!(aes_cbc_decrypt(&key, &iv, &ct).unwrap(), pt);
    }

    #[test]
    fn test_hmac_rfc4231_case2() {
        let tag = hmac_hex(b"Jefe", &[b"what do ya want ", b"for nothing?"]).unwrap();
        assert_eq!(
            tag,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_fixed_iv_is_deterministic() {
        let cipher = MessageCipher::with_random(FixedRandom(0));
        let a = cipher.encrypt("same", KEY).unwrap();
        let b = cipher.encrypt("same", KEY).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.iv, "0".repeat(32));
        assert_eq!(cipher.decrypt(&a, KEY).unwrap(), "same");
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let a = encrypt_message("same", KEY).unwrap();
        let b = encrypt_message("same", KEY).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.text, b.text);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(
            encrypt_message("", KEY),
            Err(CryptoError::InvalidArgument(_))
        ));
        assert!(matches!(
            encrypt_message("hi", ""),
            Err(CryptoError::InvalidArgument(_))
        ));

        let mut env = encrypt_message("hi", KEY).unwrap();
        assert!(matches!(
            decrypt_message(&env, ""),
            Err(CryptoError::InvalidArgument(_))
        ));
        env.text.clear();
        assert!(matches!(
            decrypt_message(&env, KEY),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_short_key_rejected_both_ways() {
        let short = &KEY[..40];
        assert!(matches!(
            encrypt_message("hi", short),
            Err(CryptoError::InvalidKey(_))
        ));
        let env = encrypt_message("hi", KEY).unwrap();
        assert!(matches!(
            decrypt_message(&env, short),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_short_key_rejected_before_randomness() {
        let cipher = MessageCipher::with_random(BrokenRandom);
        assert!(matches!(
            cipher.encrypt("hi", "abcd"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_rng_failure_is_primitive_error() {
        let cipher = MessageCipher::with_random(BrokenRandom);
        assert!(matches!(
            cipher.encrypt("hi", KEY),
            Err(CryptoError::Primitive(_))
        ));
    }

    #[test]
    fn test_truncated_key_decrypts() {
        let env = encrypt_message("extra key material", KEY).unwrap();
        let long = format!("{KEY}ffffffff");
        assert_eq!(decrypt_message(&env, &long).unwrap(), "extra key material");
    }

    #[test]
    fn test_wrong_key_rejected() {
        let env = encrypt_message("for your eyes only", KEY).unwrap();
        let err = decrypt_message(&env, OTHER_KEY).unwrap_err();
        assert!(err.is_integrity());
        assert_eq!(err.to_string(), "integrity check failed: Decryption failed");
    }

    #[test]
    fn test_tampered_text_iv_and_tag() {
        let env = encrypt_message("tamper target", KEY).unwrap();

        for i in 0..env.text.len() {
            let mut bad = env.clone();
            bad.text = flip_hex(&env.text, i);
            assert!(decrypt_message(&bad, KEY).unwrap_err().is_integrity());
        }
        for i in 0..env.iv.len() {
            let mut bad = env.clone();
            bad.iv = flip_hex(&env.iv, i);
            assert!(decrypt_message(&bad, KEY).unwrap_err().is_integrity());
        }
        let tag = env.tag.clone().unwrap();
        for i in 0..tag.len() {
            let mut bad = env.clone();
            bad.tag = Some(flip_hex(&tag, i));
            assert!(decrypt_message(&bad, KEY).unwrap_err().is_integrity());
        }
    }

    #[test]
    fn test_truncated_tag_rejected() {
        let mut env = encrypt_message("short tag", KEY).unwrap();
        env.tag = env.tag.map(|t| t[..63].to_string());
        assert!(decrypt_message(&env, KEY).unwrap_err().is_integrity());
    }

    #[test]
    fn test_uppercase_tag_rejected() {
        let mut env = encrypt_message("case matters", KEY).unwrap();
        env.tag = env.tag.map(|t| t.to_uppercase());
        // only fails if the tag contains a letter, which it does with overwhelming probability
        if env.tag.as_deref().is_some_and(|t| t.chars().any(|c| c.is_ascii_alphabetic())) {
            assert!(decrypt_message(&env, KEY).unwrap_err().is_integrity());
        }
    }

    #[test]
    fn test_legacy_envelope_allowed_by_default() {
        let mut env = encrypt_message("before tags existed", KEY).unwrap();
        env.tag = None;
        assert_eq!(decrypt_message(&env, KEY).unwrap(), "before tags existed");
    }

    #[test]
    fn test_empty_tag_is_legacy() {
        let mut env = encrypt_message("blank tag", KEY).unwrap();
        env.tag = Some(String::new());
        assert_eq!(decrypt_message(&env, KEY).unwrap(), "blank tag");

        let strict = MessageCipher::new().with_legacy_policy(LegacyEnvelopePolicy::Reject);
        assert!(strict.decrypt(&env, KEY).unwrap_err().is_integrity());
    }

    #[test]
    fn test_legacy_envelope_rejected_by_policy() {
        let strict = MessageCipher::new().with_legacy_policy(LegacyEnvelopePolicy::Reject);
        let mut env = strict.encrypt("strict mode", KEY).unwrap();
        assert_eq!(strict.decrypt(&env, KEY).unwrap(), "strict mode");
        env.tag = None;
        assert!(strict.decrypt(&env, KEY).unwrap_err().is_integrity());
    }

    #[test]
    fn test_legacy_corrupt_iv_is_integrity_error() {
        let mut env = encrypt_message("legacy", KEY).unwrap();
        env.tag = None;
        env.iv = "abcd".to_string();
        assert!(decrypt_message(&env, KEY).unwrap_err().is_integrity());
        env.iv = "not hex at all".to_string();
        assert!(decrypt_message(&env, KEY).unwrap_err().is_integrity());
    }

    #[test]
    fn test_legacy_odd_length_text_is_integrity_error() {
        let mut env = encrypt_message("legacy", KEY).unwrap();
        env.tag = None;
        env.text.pop();
        assert!(decrypt_message(&env, KEY).unwrap_err().is_integrity());
    }

    #[test]
    fn test_empty_plaintext_after_decrypt_rejected() {
        // A lone padding block decrypts to zero bytes.
        let key = EncryptionKey::parse(KEY).unwrap();
        let iv = [9u8; IV_SIZE];
        let ct = aes_cbc_encrypt(key.as_bytes(), &iv, b"");
        let iv_hex = hex::encode(iv);
        let text = hex::encode(ct);
        let tag = compute_tag(&key, &iv_hex, &text).unwrap();
        let env = EncryptedEnvelope {
            text,
            iv: iv_hex,
            salt: String::new(),
            tag: Some(tag),
            algorithm: ALGORITHM.to_string(),
        };
        assert!(decrypt_message(&env, KEY).unwrap_err().is_integrity());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(text in "\\PC{1,200}", key in "[0-9a-f]{64}") {
            let env = encrypt_message(&text, &key).unwrap();
            prop_assert_eq!(decrypt_message(&env, &key).unwrap(), text);
        }

        #[test]
        fn prop_wrong_key_never_yields_plaintext(
            text in "[a-z ]{1,64}",
            k1 in "[0-9a-f]{64}",
            k2 in "[0-9a-f]{64}",
        ) {
            prop_assume!(k1 != k2);
            let env = encrypt_message(&text, &k1).unwrap();
            prop_assert!(decrypt_message(&env, &k2).is_err());
        }
    }
}
