//! Content fingerprinting for duplicate detection.

use sha2::{Digest, Sha256};

/// Compute a stable fingerprint over content bytes.
///
/// The fingerprint is a SHA-256 over *normalized* text, not the raw
/// bytes: two renditions of the same logical content that differ only in
/// case, punctuation or whitespace (e.g. a timestamp re-formatted by a
/// non-deterministic generator) must collapse to one fingerprint.
/// Normalization rules:
/// - Decode as UTF-8 (lossily) and lowercase
/// - Drop all non-alphanumeric characters except whitespace
/// - Collapse whitespace runs into single spaces, trim the ends
pub fn fingerprint(content: &[u8]) -> String {
    let normalized = normalize(&String::from_utf8_lossy(content));
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalize text prior to hashing.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
