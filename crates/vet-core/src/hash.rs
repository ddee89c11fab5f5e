//! Content hashing using SHA-256.

use sha2::{Digest, Sha256};

/// Number of hex characters of the path hash embedded in block ids.
pub const SHORT_HASH_LEN: usize = 8;

/// Compute the SHA-256 hash of arbitrary bytes, returned as a hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex_encode(&result)
}

/// Compute the SHA-256 hash of a string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// The first [`SHORT_HASH_LEN`] hex characters of the SHA-256 of `s`.
pub fn short_hash(s: &str) -> String {
    let mut full = hash_str(s);
    full.truncate(SHORT_HASH_LEN);
    full
}

/// Encode raw bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = hash_str("hello world");
        let h2 = hash_str("hello world");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(hash_str("hello"), hash_str("world"));
    }

    #[test]
    fn test_hash_length() {
        // SHA-256 produces 64 hex characters
        assert_eq!(hash_str("test").len(), 64);
    }

    #[test]
    fn test_short_hash_is_prefix() {
        let short = short_hash("/src/main.rs");
        assert_eq!(short.len(), SHORT_HASH_LEN);
        assert!(hash_str("/src/main.rs").starts_with(&short));
        assert!(short.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
