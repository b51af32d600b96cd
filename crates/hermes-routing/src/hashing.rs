//! # Identifier Hashing
//!
//! Stable short identifiers from opaque transport tokens. The hash is the
//! only thing downstream systems ever see, so raw message ids and phone
//! numbers never leak past the extractor.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Length of a hashed thread identifier
pub const THREAD_ID_LEN: usize = 8;

/// SHA-256 → base64url → first 8 characters
pub fn short_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded[..THREAD_ID_LEN].to_string()
}

/// Fresh identifier for conversations with no continuity token:
/// base36 unix millis plus four random base36 characters
pub fn synthetic_thread_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut id = to_base36(millis);
    for _ in 0..4 {
        id.push(BASE36[fastrand::usize(..BASE36.len())] as char);
    }
    id
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_is_deterministic() {
        assert_eq!(short_hash("abc@x"), short_hash("abc@x"));
        assert_ne!(short_hash("abc@x"), short_hash("abc@y"));
    }

    #[test]
    fn test_short_hash_shape() {
        let hash = short_hash("abc@x");
        assert_eq!(hash.len(), THREAD_ID_LEN);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_short_hash_matches_primitives() {
        let digest = Sha256::digest(b"abc@x");
        let expected = &URL_SAFE_NO_PAD.encode(digest)[..8];
        assert_eq!(short_hash("abc@x"), expected);
    }

    #[test]
    fn test_synthetic_ids_are_distinct() {
        let a = synthetic_thread_id();
        let b = synthetic_thread_id();
        // Same millisecond is likely; the random suffix still separates them
        assert_ne!(a, b);
        assert!(a.len() > THREAD_ID_LEN);
    }

    #[test]
    fn test_base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
