//! Content fingerprints and round-trip checks

use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 bytes of `text`, as 64 lowercase hex characters.
pub fn hash_string(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Exact byte-for-byte comparison of an original and a decrypted message.
///
/// No normalization of any kind is applied.
pub fn verify_message_integrity(original: &str, decrypted: &str) -> bool {
    original == decrypted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_values() {
        assert_eq!(
            hash_string("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hash_string(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash_string("abc"), hash_string("abc"));
        assert_ne!(hash_string("abc"), hash_string("abd"));
    }

    #[test]
    fn test_hash_length_independent_of_input() {
        let long = "x".repeat(100_000);
        for input in ["", "a", long.as_str()] {
            let h = hash_string(input);
            assert_eq!(h.len(), 64);
            assert!(h.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn test_verify_integrity_exact() {
        assert!(verify_message_integrity("see you at the gate", "see you at the gate"));
        assert!(!verify_message_integrity("see you", "see you "));
        assert!(!verify_message_integrity("see you", "See you"));
        assert!(verify_message_integrity("", ""));
    }

    #[test]
    fn test_verify_integrity_no_unicode_normalization() {
        // precomposed vs decomposed e-acute
        assert!(!verify_message_integrity("caf\u{e9}", "cafe\u{301}"));
    }
}
