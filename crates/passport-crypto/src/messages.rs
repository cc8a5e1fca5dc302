//! Batch encryption of stored chat messages
//!
//! A [`ChatMessage`] is the record callers persist for a direct message. When
//! encrypted, `text` holds the envelope ciphertext and the remaining envelope
//! fields sit next to it on the same record. Fields this crate does not know
//! about are carried through untouched.
//!
//! Both batch operations are fail-fast: the first error aborts the batch and
//! nothing is returned for the other messages. Output order always matches
//! input order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::envelope::{EncryptedEnvelope, MessageCipher};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::EncryptionKey;
use crate::rng::{OsRandom, RandomSource};
use crate::ALGORITHM;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Plaintext kept alongside the ciphertext by the migration path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// The envelope stored on this record, if it is marked encrypted.
    pub fn envelope(&self) -> Option<EncryptedEnvelope> {
        if !is_encrypted_envelope(self) {
            return None;
        }
        Some(EncryptedEnvelope {
            text: self.text.clone(),
            iv: self.iv.clone().unwrap_or_default(),
            salt: self.salt.clone().unwrap_or_default(),
            tag: self.tag.clone(),
            algorithm: self
                .algorithm
                .clone()
                .unwrap_or_else(|| ALGORITHM.to_string()),
        })
    }

    fn apply_envelope(&mut self, envelope: EncryptedEnvelope) {
        let plaintext = std::mem::replace(&mut self.text, envelope.text);
        self.original_text = Some(plaintext);
        self.encrypted = true;
        self.iv = Some(envelope.iv);
        self.salt = Some(envelope.salt);
        self.tag = envelope.tag;
        self.algorithm = Some(envelope.algorithm);
    }

    fn clear_envelope(&mut self, plaintext: String) {
        self.text = plaintext;
        self.encrypted = false;
        self.iv = None;
        self.salt = None;
        self.tag = None;
        self.algorithm = None;
    }
}

/// Whether a record carries an envelope: marked encrypted and has an IV.
pub fn is_encrypted_envelope(message: &ChatMessage) -> bool {
    message.encrypted && message.iv.is_some()
}

impl<R: RandomSource> MessageCipher<R> {
    /// Encrypt every message not already marked encrypted.
    pub fn encrypt_messages(
        &self,
        messages: Vec<ChatMessage>,
        key: &str,
    ) -> CryptoResult<Vec<ChatMessage>> {
        if key.is_empty() {
            return Err(CryptoError::InvalidArgument("key is required"));
        }
        let key = EncryptionKey::parse(key)?;

        messages
            .into_par_iter()
            .map(|mut message| -> CryptoResult<ChatMessage> {
                if message.encrypted {
                    return Ok(message);
                }
                let envelope = self.encrypt_with_key(&message.text, &key)?;
                message.apply_envelope(envelope);
                Ok(message)
            })
            .collect()
    }

    /// Decrypt every encrypted message; plaintext messages pass through.
    pub fn decrypt_messages(
        &self,
        messages: Vec<ChatMessage>,
        key: &str,
    ) -> CryptoResult<Vec<ChatMessage>> {
        if key.is_empty() {
            return Err(CryptoError::InvalidArgument("key is required"));
        }
        let key = EncryptionKey::parse(key)?;

        messages
            .into_par_iter()
            .map(|mut message| -> CryptoResult<ChatMessage> {
                if !message.encrypted {
                    return Ok(message);
                }
                let envelope = message.envelope().ok_or(CryptoError::InvalidArgument(
                    "encrypted message has no iv",
                ))?;
                let plaintext = self.decrypt_with_key(&envelope, &key)?;
                message.clear_envelope(plaintext);
                Ok(message)
            })
            .collect()
    }
}

pub fn bulk_encrypt_messages(
    messages: Vec<ChatMessage>,
    key: &str,
) -> CryptoResult<Vec<ChatMessage>> {
    MessageCipher::<OsRandom>::new().encrypt_messages(messages, key)
}

/// Uses [`LegacyEnvelopePolicy::Allow`](crate::LegacyEnvelopePolicy); build a
/// [`MessageCipher`] with another policy to reject untagged envelopes.
pub fn bulk_decrypt_messages(
    messages: Vec<ChatMessage>,
    key: &str,
) -> CryptoResult<Vec<ChatMessage>> {
    MessageCipher::<OsRandom>::new().decrypt_messages(messages, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{decrypt_message, LegacyEnvelopePolicy};

    const KEY: &str = "7f3c9a0e5b2d4f6a8c1e3b5d7f9a2c4e6b8d0f1a3c5e7b9d2f4a6c8e0b1d3f5a";

    fn inbox() -> Vec<ChatMessage> {
        vec![
            ChatMessage::new("m1", "landed in Reykjavik"),
            ChatMessage::new("m2", "stamp collected"),
            ChatMessage::new("m3", "see you at the hostel"),
        ]
    }

    #[test]
    fn test_bulk_encrypt_preserves_order_and_original() {
        let out = bulk_encrypt_messages(inbox(), KEY).unwrap();
        assert_eq!(out.len(), 3);
        for (orig, enc) in inbox().iter().zip(&out) {
            assert_eq!(enc.id, orig.id);
            assert!(enc.encrypted);
            assert_eq!(enc.original_text.as_deref(), Some(orig.text.as_str()));
            assert_ne!(enc.text, orig.text);
            assert_eq!(enc.algorithm.as_deref(), Some("AES-256-CBC-HMAC"));
            assert_eq!(enc.salt.as_deref(), Some(""));

            let env = enc.envelope().unwrap();
            assert_eq!(decrypt_message(&env, KEY).unwrap(), orig.text);
        }
    }

    #[test]
    fn test_already_encrypted_pass_through() {
        let first = bulk_encrypt_messages(inbox(), KEY).unwrap();
        let second = bulk_encrypt_messages(first.clone(), KEY).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bulk_fails_fast_on_bad_message() {
        let mut messages = inbox();
        messages.push(ChatMessage::new("m4", ""));
        assert!(matches!(
            bulk_encrypt_messages(messages, KEY),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bulk_rejects_bad_key_even_when_empty() {
        assert!(matches!(
            bulk_encrypt_messages(Vec::new(), "abc"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            bulk_encrypt_messages(Vec::new(), ""),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bulk_decrypt_restores_plaintext() {
        let mut mixed = bulk_encrypt_messages(inbox(), KEY).unwrap();
        mixed.push(ChatMessage::new("m4", "plain"));

        let out = bulk_decrypt_messages(mixed, KEY).unwrap();
        let texts: Vec<_> = out.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            [
                "landed in Reykjavik",
                "stamp collected",
                "see you at the hostel",
                "plain"
            ]
        );
        assert!(out.iter().all(|m| !m.encrypted && m.iv.is_none() && m.tag.is_none()));
    }

    #[test]
    fn test_bulk_decrypt_wrong_key_fails() {
        let enc = bulk_encrypt_messages(inbox(), KEY).unwrap();
        let other = "0".repeat(64);
        assert!(bulk_decrypt_messages(enc, &other).unwrap_err().is_integrity());
    }

    #[test]
    fn test_encrypted_without_iv_is_invalid() {
        let mut msg = ChatMessage::new("m1", "abcdef");
        msg.encrypted = true;
        assert!(!is_encrypted_envelope(&msg));
        assert!(msg.envelope().is_none());
        assert!(matches!(
            bulk_decrypt_messages(vec![msg], KEY),
            Err(CryptoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_strict_policy_applies_to_batch() {
        let mut enc = bulk_encrypt_messages(inbox(), KEY).unwrap();
        enc[1].tag = None;
        let strict = MessageCipher::new().with_legacy_policy(LegacyEnvelopePolicy::Reject);
        assert!(strict.decrypt_messages(enc.clone(), KEY).unwrap_err().is_integrity());
        assert_eq!(bulk_decrypt_messages(enc, KEY).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_fields_survive_json() {
        let json = r#"[{"id":"m1","text":"hi there","senderId":"u42","createdAt":1700000000}]"#;
        let messages: Vec<ChatMessage> = serde_json::from_str(json).unwrap();
        let enc = bulk_encrypt_messages(messages, KEY).unwrap();

        let value = serde_json::to_value(&enc).unwrap();
        assert_eq!(value[0]["senderId"], "u42");
        assert_eq!(value[0]["createdAt"], 1_700_000_000);
        assert_eq!(value[0]["originalText"], "hi there");
        assert_eq!(value[0]["encrypted"], true);
    }
}
