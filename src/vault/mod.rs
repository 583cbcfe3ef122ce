//! Metadata Vault
//!
//! Seals a manifest under the process-wide master key and reverses the
//! operation. Exactly one sealed file is ever written per stored object;
//! no unsealed manifest is ever persisted.

use thiserror::Error;

use crate::engine::crypto::{CryptoError, MasterKey};
use crate::manifest::Manifest;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("MASTER_VAULT_KEY is missing or not a valid Fernet key")]
    NoMasterKey,

    #[error("sealed manifest failed authentication")]
    Tampered,

    #[error("unsealed manifest does not match the manifest schema: {0}")]
    Schema(String),
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Tampered => VaultError::Tampered,
            CryptoError::InvalidKey(_) => VaultError::NoMasterKey,
        }
    }
}

/// Seals and unseals manifests under the process-wide master key.
#[derive(Clone)]
pub struct Vault {
    master_key: MasterKey,
}

impl Vault {
    /// Load the master key from `MASTER_VAULT_KEY`. Fails fast if the
    /// variable is absent or not a valid Fernet key — the orchestrator
    /// treats this as a fatal start-up `Configuration` error.
    pub fn from_env() -> Result<Self, VaultError> {
        let raw = std::env::var("MASTER_VAULT_KEY").map_err(|_| VaultError::NoMasterKey)?;
        Self::from_encoded(&raw)
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, VaultError> {
        let master_key = MasterKey::from_encoded(encoded).map_err(|_| VaultError::NoMasterKey)?;
        Ok(Self { master_key })
    }

    /// Canonical JSON-encode the manifest, then authenticated-encrypt it
    /// under the master key.
    pub fn seal(&self, manifest: &Manifest) -> Result<Vec<u8>, VaultError> {
        let json = serde_json::to_vec(manifest).map_err(|e| VaultError::Schema(e.to_string()))?;
        Ok(self.master_key.seal(&json))
    }

    /// Authenticated-decrypt, then parse. No fallback to plaintext parsing —
    /// a legacy plaintext manifest is never transparently accepted.
    pub fn unseal(&self, sealed: &[u8]) -> Result<Manifest, VaultError> {
        let json = self.master_key.unseal(sealed)?;
        serde_json::from_slice(&json).map_err(|e| VaultError::Schema(e.to_string()))
    }
}
