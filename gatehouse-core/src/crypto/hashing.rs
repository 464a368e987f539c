//! SHA-256 hashing and verifying-key fingerprints.

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of the input data.
#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compact lookup key for a verifying key.
///
/// Hex-encoded SHA-256 of the verifying key's hex text. Hashing the text
/// rather than the decoded bytes keeps this total over untrusted input,
/// and case is folded so both encodings of one key share a fingerprint.
pub fn fingerprint(verifying_key: &str) -> String {
    hex::encode(sha256(verifying_key.to_ascii_lowercase().as_bytes()))
}
