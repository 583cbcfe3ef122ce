//! Content hashing using SHA-256
//!
//! Every integrity tag in the system — per-shard and whole-file — is a
//! hex-encoded SHA-256 digest. Kept as a standalone module because both the
//! engine and the vault need it.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// `true` iff `data` hashes to `expected_hex` (case-insensitive hex compare).
pub fn verify_sha256_hex(data: &[u8], expected_hex: &str) -> bool {
    sha256_hex(data).eq_ignore_ascii_case(expected_hex)
}
