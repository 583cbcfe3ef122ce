//! shardvault_core
//!
//! The client-side engine behind a distributed object store: encrypt each
//! file under a fresh per-file key, erasure-code the ciphertext into `m`
//! shards of which any `k` reconstruct it, and distribute the shards across
//! `m` storage nodes. Per-file keys never leave the process except wrapped
//! inside an envelope-encrypted manifest, sealed under a process-wide master
//! key.
//!
//! - [`engine`] — the stateless encrypt/shard and reconstruct/decrypt pipeline.
//! - [`manifest`] — the closed-schema, per-object manifest.
//! - [`vault`] — seals and unseals manifests under the master key.
//! - [`node`] — the HTTP client to a single storage node.
//! - [`orchestrator`] — binds the above into atomic upload/download/list/health.
//!
//! This crate is the store's core: it has no HTTP gateway, no per-node
//! server, and no CLI. Those are separate binaries built on top of it.

pub mod engine;
pub mod manifest;
pub mod node;
pub mod orchestrator;
pub mod vault;

pub use engine::{CodeParams, CryptoError, EngineError, FileKey};
pub use manifest::Manifest;
pub use node::NodeClient;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
pub use vault::{Vault, VaultError};

use thiserror::Error;

/// Aggregate error across every layer of the crate, for callers that don't
/// need to distinguish which layer failed.
#[derive(Error, Debug)]
pub enum ShardVaultError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

pub type Result<T> = std::result::Result<T, ShardVaultError>;
