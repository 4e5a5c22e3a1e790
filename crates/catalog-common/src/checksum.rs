//! SHA-256 digests for content logging and identity suffixes

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// First `len` hex digits of the SHA-256 of `value`.
///
/// Used where a short, stable fingerprint of an identity is needed
/// (e.g. disambiguating generated slugs).
pub fn short_digest(value: &str, len: usize) -> String {
    let mut digest = sha256_hex(value.as_bytes());
    digest.truncate(len.min(digest.len()));
    digest
}
