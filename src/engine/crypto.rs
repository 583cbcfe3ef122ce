//! Per-file encryption using the Fernet construction
//!
//! Fernet is AES-128-CBC encryption authenticated with HMAC-SHA-256 over a
//! timestamped, versioned envelope, the whole thing base64url-encoded. It is
//! the construction the manifest's `encryption_key` and the sealed manifest
//! itself both rely on: one for per-file ciphertext, the other (via the
//! master key) for the manifest envelope.

use fernet::Fernet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("decryption failed: tampered or wrong key")]
    Tampered,
}

/// Exact byte length of a Fernet token for a plaintext of `plaintext_len`
/// bytes. Fernet's wire format is deterministic: a 1-byte version, an 8-byte
/// timestamp, a 16-byte IV, the AES-128-CBC ciphertext (PKCS7-padded to a
/// multiple of 16, always adding between 1 and 16 bytes), and a 32-byte
/// HMAC-SHA256, the whole thing base64-encoded with padding. Knowing this
/// lets the reconstruction path recover the token's exact length from
/// `file_size` alone, with nothing extra to carry in the manifest.
pub fn fernet_token_len(plaintext_len: usize) -> usize {
    let padding = 16 - (plaintext_len % 16);
    let raw_len = 1 + 8 + 16 + plaintext_len + padding + 32;
    raw_len.div_ceil(3) * 4
}

/// A 32-byte urlsafe-base64 Fernet key, generated fresh per file.
///
/// This is the type that ends up, verbatim, in `Manifest::encryption_key`.
/// It never leaves the orchestrator boundary except inside a sealed
/// manifest.
#[derive(Clone)]
pub struct FileKey {
    encoded: String,
    fernet: Fernet,
}

impl FileKey {
    /// Generate a fresh per-file key from the OS RNG.
    pub fn generate() -> Self {
        let encoded = Fernet::generate_key();
        let fernet = Fernet::new(&encoded).expect("freshly generated Fernet key is always valid");
        Self { encoded, fernet }
    }

    /// Load a key previously emitted by [`FileKey::generate`] (e.g. read back
    /// out of an unsealed manifest).
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let fernet =
            Fernet::new(encoded).ok_or_else(|| CryptoError::InvalidKey(encoded.to_string()))?;
        Ok(Self {
            encoded: encoded.to_string(),
            fernet,
        })
    }

    /// The urlsafe-base64 encoding stored in the manifest.
    pub fn as_encoded(&self) -> &str {
        &self.encoded
    }

    /// Encrypt `plaintext` into a Fernet token (ciphertext).
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.fernet.encrypt(plaintext).into_bytes()
    }

    /// Decrypt a Fernet token. Any MAC failure, expired/garbled token, or
    /// malformed base64 is reported uniformly as [`CryptoError::Tampered`] —
    /// the caller cannot distinguish "wrong key" from "corrupted ciphertext",
    /// which is the point: neither should be treated differently.
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let token_str = std::str::from_utf8(token).map_err(|_| CryptoError::Tampered)?;
        self.fernet
            .decrypt(token_str)
            .map_err(|_| CryptoError::Tampered)
    }
}

/// The process-wide master key, loaded once from `MASTER_VAULT_KEY`.
#[derive(Clone)]
pub struct MasterKey {
    fernet: Fernet,
}

impl MasterKey {
    pub fn from_encoded(encoded: &str) -> Result<Self, CryptoError> {
        let fernet = Fernet::new(encoded)
            .ok_or_else(|| CryptoError::InvalidKey("malformed master key".into()))?;
        Ok(Self { fernet })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        self.fernet.encrypt(plaintext).into_bytes()
    }

    pub fn unseal(&self, token: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let token_str = std::str::from_utf8(token).map_err(|_| CryptoError::Tampered)?;
        self.fernet
            .decrypt(token_str)
            .map_err(|_| CryptoError::Tampered)
    }
}
