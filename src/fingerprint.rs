//! Content fingerprints shared by dedup tracking and the embedding cache

use sha2::Digest;
use sha2::Sha256;

/// Lowercase hex SHA-256 of the raw content bytes
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash several parts with a separator so `("ab", "c")` and `("a", "bc")` differ
pub fn composite_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
