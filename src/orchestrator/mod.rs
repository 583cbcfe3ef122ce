//! Orchestrator
//!
//! Binds the crypto-erasure engine, the metadata vault, and one client per
//! storage node into an atomic, rollback-capable upload, a threshold-
//! reconstructing download, and health/listing aggregation. This is where
//! the `(k, m)` layout and the per-filename concurrency guarantees live.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::engine::{self, erasure, CodeParams, EngineError, FileKey};
use crate::manifest::Manifest;
use crate::node::NodeClient;
use crate::vault::{Vault, VaultError};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input rejected: {0}")]
    InputRejected(String),

    #[error("only {online} of {total} nodes reachable")]
    NodeUnavailable { online: usize, total: usize },

    #[error("upload failed: {count} shard upload(s) rejected, rolled back")]
    UploadFailed { count: usize },

    #[error("manifest could not be persisted, rolled back")]
    ManifestPersistFailed,

    #[error("not enough shards available: have {have}, need {need}")]
    Unavailable { have: usize, need: usize },

    #[error("tamper detected: {0}")]
    Tampered(String),

    #[error("vault error: {0}")]
    Vault(VaultError),
}

/// A missing or invalid master key is a start-up `Configuration` failure,
/// not a per-file `Vault` error, even though both originate from the vault:
/// the former means the orchestrator can never come up, the latter means
/// one sealed manifest is corrupt or schema-invalid.
impl From<VaultError> for OrchestratorError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NoMasterKey => OrchestratorError::Configuration(e.to_string()),
            other => OrchestratorError::Vault(other),
        }
    }
}

impl From<EngineError> for OrchestratorError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Insufficient { have, need } => OrchestratorError::Unavailable { have, need },
            EngineError::Tampered(ctx) => OrchestratorError::Tampered(ctx.to_string()),
            EngineError::Empty => OrchestratorError::InputRejected("empty upload".to_string()),
            other @ (EngineError::Crypto(_) | EngineError::Code(_)) => {
                OrchestratorError::Configuration(other.to_string())
            }
        }
    }
}

/// Constructed once per process and held read-only thereafter; no
/// module-level singletons for the master key or the node list.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ordered node URLs; shard `i` is always delivered to `node_urls[i]`.
    pub node_urls: Vec<String>,
    pub k: usize,
    pub m: usize,
    pub metadata_dir: PathBuf,
    pub put_get_timeout: Duration,
    pub health_delete_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            node_urls: vec![],
            k: 3,
            m: 5,
            metadata_dir: PathBuf::from("metadata"),
            put_get_timeout: Duration::from_secs(30),
            health_delete_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Optimal,
    Degraded,
    Critical,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub online_count: usize,
    pub per_node: Vec<bool>,
    pub status: SystemStatus,
}

#[derive(Debug, Clone)]
pub struct ManifestSummary {
    pub filename: String,
    pub file_hash_prefix: String,
    pub file_size: usize,
    pub upload_date: String,
    pub k_required: usize,
    pub m_total: usize,
}

/// Binds engine, vault, and per-node clients; owns the per-filename lock map.
pub struct Orchestrator {
    config: OrchestratorConfig,
    params: CodeParams,
    vault: Vault,
    nodes: Vec<NodeClient>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Orchestrator {
    /// Load the master key from `MASTER_VAULT_KEY`. Fatal `Configuration`
    /// error if the key is missing, the `(k, m)` layout is invalid, or the
    /// node URL count does not match `m`.
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let vault = Vault::from_env()?;
        Self::build(config, vault)
    }

    /// Like [`Orchestrator::new`] but takes an already-constructed vault —
    /// for tests, which cannot rely on a shared process environment
    /// variable across concurrent cases.
    pub fn with_vault(config: OrchestratorConfig, vault: Vault) -> Result<Self, OrchestratorError> {
        Self::build(config, vault)
    }

    fn build(config: OrchestratorConfig, vault: Vault) -> Result<Self, OrchestratorError> {
        if config.k == 0 || config.k > config.m {
            return Err(OrchestratorError::Configuration(format!(
                "invalid (k, m) layout: k={}, m={}",
                config.k, config.m
            )));
        }
        if config.node_urls.len() != config.m {
            return Err(OrchestratorError::Configuration(format!(
                "expected {} node URLs, got {}",
                config.m,
                config.node_urls.len()
            )));
        }

        let nodes = config
            .node_urls
            .iter()
            .map(|url| NodeClient::with_timeouts(url.clone(), config.put_get_timeout, config.health_delete_timeout))
            .collect();

        Ok(Self {
            params: CodeParams::new(config.k, config.m),
            config,
            vault,
            nodes,
            locks: DashMap::new(),
        })
    }

    fn manifest_path(&self, filename: &str) -> PathBuf {
        self.config.metadata_dir.join(format!("{filename}.metadata.json"))
    }

    async fn lock_for(&self, filename: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(filename.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn online_count(&self) -> usize {
        let checks = self.nodes.iter().map(|n| n.health());
        futures::future::join_all(checks).await.into_iter().filter(|ok| *ok).count()
    }

    /// Encrypt, shard, and distribute `plaintext` across all `m` nodes under
    /// `filename`, sealing a manifest only once every shard has landed.
    /// Returns the path to the sealed manifest.
    ///
    /// The lock acquisition through manifest persistence (including
    /// rollback) runs inside its own `tokio::spawn`'d task, not inline in
    /// this `async fn`. A caller that drops this future early — a
    /// `tokio::time::timeout`, a `select!` losing a race, outright
    /// cancellation — only ever stops polling the `JoinHandle`; the spawned
    /// task keeps running to completion, so rollback always finishes before
    /// any shard-vs-manifest inconsistency could become observable.
    pub async fn upload(&self, filename: &str, plaintext: &[u8]) -> Result<PathBuf, OrchestratorError> {
        let online = self.online_count().await;
        if online < self.config.m {
            tracing::warn!(filename, online, total = self.config.m, "upload refused, nodes unavailable");
            return Err(OrchestratorError::NodeUnavailable { online, total: self.config.m });
        }

        let lock = self.lock_for(filename).await;
        let vault = self.vault.clone();
        let nodes = self.nodes.clone();
        let params = self.params;
        let path = self.manifest_path(filename);
        let filename = filename.to_string();
        let plaintext = plaintext.to_vec();

        let task = tokio::spawn(async move {
            let _guard = lock.lock().await;
            Self::run_upload(&vault, &nodes, params, &path, &filename, &plaintext).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(OrchestratorError::Configuration(format!("upload task panicked: {e}"))),
        }
    }

    /// The shielded critical section of [`Orchestrator::upload`]: encode,
    /// fan out, seal, persist, rolling back on any failure. Takes owned/
    /// cloned handles rather than `&self` so it can be driven inside a
    /// spawned task that outlives the calling future.
    async fn run_upload(
        vault: &Vault,
        nodes: &[NodeClient],
        params: CodeParams,
        path: &PathBuf,
        filename: &str,
        plaintext: &[u8],
    ) -> Result<PathBuf, OrchestratorError> {
        let encoded = engine::encrypt_and_shard(plaintext, params)?;
        tracing::debug!(filename, shards = encoded.shards.len(), bytes = plaintext.len(), "encoded for upload");

        let uploads = encoded.shards.iter().map(|shard| {
            let storage_id = NodeClient::shard_storage_id(filename, shard.shard_id);
            let node = &nodes[shard.shard_id];
            let data = shard.data.clone();
            async move { (shard.shard_id, node.upload(&storage_id, data).await) }
        });
        let results = futures::future::join_all(uploads).await;

        let failed: Vec<usize> = results.iter().filter(|(_, ok)| !ok).map(|(id, _)| *id).collect();
        if !failed.is_empty() {
            tracing::warn!(filename, failed = failed.len(), "shard upload(s) failed, rolling back");
            Self::rollback(nodes, filename, &encoded.shards).await;
            return Err(OrchestratorError::UploadFailed { count: failed.len() });
        }

        let shard_locations: HashMap<usize, String> = (0..nodes.len())
            .map(|i| (i, nodes[i].base_url().to_string()))
            .collect();

        let manifest = Manifest {
            filename: filename.to_string(),
            file_hash: encoded.whole_file_hash,
            file_size: plaintext.len(),
            encryption_key: encoded.file_key.as_encoded().to_string(),
            k_required: params.k,
            m_total: params.m,
            shard_metadata: encoded.shard_hashes,
            upload_date: chrono::Utc::now().to_rfc3339(),
            shard_locations,
        };

        let sealed = vault.seal(&manifest)?;

        if let Err(e) = Self::persist_manifest(path, &sealed).await {
            tracing::warn!(filename, error = %e, "manifest persist failed, rolling back");
            Self::rollback(nodes, filename, &encoded.shards).await;
            return Err(OrchestratorError::ManifestPersistFailed);
        }

        tracing::info!(filename, m = nodes.len(), "upload committed");
        Ok(path.clone())
    }

    async fn rollback(nodes: &[NodeClient], filename: &str, shards: &[erasure::Shard]) {
        let deletes = shards.iter().map(|shard| {
            let storage_id = NodeClient::shard_storage_id(filename, shard.shard_id);
            let node = &nodes[shard.shard_id];
            async move { node.delete(&storage_id).await }
        });
        futures::future::join_all(deletes).await;
    }

    /// Write-to-temp, fsync, rename — never leaves a half-written manifest
    /// visible under the real path.
    async fn persist_manifest(path: &PathBuf, sealed: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(sealed).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    /// Client for a shard's recorded location. Falls back to a fresh client
    /// when the manifest's `shard_locations` URL no longer matches any of
    /// the orchestrator's configured nodes (e.g. the node list was
    /// reconfigured since this file was uploaded).
    fn client_for(&self, url: &str) -> NodeClient {
        self.nodes
            .iter()
            .find(|n| n.base_url() == url)
            .cloned()
            .unwrap_or_else(|| NodeClient::with_timeouts(url, self.config.put_get_timeout, self.config.health_delete_timeout))
    }

    /// Unseal the manifest, fast-fail if too few of its nodes are healthy,
    /// then fan out `get` to all `m` nodes and reconstruct once at least
    /// `k_required` shards verify and arrive.
    pub async fn download(&self, filename: &str) -> Result<Vec<u8>, OrchestratorError> {
        let path = self.manifest_path(filename);
        let sealed = tokio::fs::read(&path)
            .await
            .map_err(|_| OrchestratorError::InputRejected(format!("unknown filename: {filename}")))?;

        let manifest = self.vault.unseal(&sealed)?;

        let clients: Vec<NodeClient> = (0..manifest.m_total)
            .map(|i| self.client_for(&manifest.shard_locations[&i]))
            .collect();

        let health_checks = clients.iter().map(|c| c.health());
        let online = futures::future::join_all(health_checks).await.into_iter().filter(|ok| *ok).count();
        if online < manifest.k_required {
            tracing::warn!(filename, online, need = manifest.k_required, "download refused, too few nodes healthy");
            return Err(OrchestratorError::Unavailable { have: online, need: manifest.k_required });
        }

        let downloads = clients.iter().enumerate().map(|(shard_id, client)| {
            let storage_id = NodeClient::shard_storage_id(filename, shard_id);
            async move { client.download(&storage_id).await.map(|bytes| (shard_id, bytes)) }
        });
        let results = futures::future::join_all(downloads).await;
        let available: Vec<(usize, Vec<u8>)> = results.into_iter().flatten().collect();

        if available.len() < manifest.k_required {
            return Err(OrchestratorError::Unavailable {
                have: available.len(),
                need: manifest.k_required,
            });
        }

        let file_key = FileKey::from_encoded(&manifest.encryption_key).map_err(|_| VaultError::Tampered)?;

        let plaintext = engine::recover_and_decrypt(
            &available,
            &manifest.shard_metadata,
            &file_key,
            &manifest.file_hash,
            manifest.file_size,
            CodeParams::new(manifest.k_required, manifest.m_total),
        )?;

        Ok(plaintext)
    }

    /// Enumerate sealed manifests in the metadata directory, redacted.
    /// Unreadable or unparseable entries are skipped, not raised — a single
    /// damaged manifest does not take down the listing of everything else.
    pub async fn list(&self) -> Result<Vec<ManifestSummary>, OrchestratorError> {
        let mut entries = tokio::fs::read_dir(&self.config.metadata_dir)
            .await
            .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;

        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OrchestratorError::Configuration(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(sealed) = tokio::fs::read(&path).await else {
                continue;
            };
            let Ok(manifest) = self.vault.unseal(&sealed) else {
                continue;
            };
            let public = manifest.view_public();
            summaries.push(ManifestSummary {
                filename: public.filename,
                file_hash_prefix: public.file_hash.chars().take(8).collect(),
                file_size: public.file_size,
                upload_date: public.upload_date,
                k_required: public.k_required,
                m_total: public.m_total,
            });
        }
        Ok(summaries)
    }

    /// Probe every node in parallel and derive the aggregate system status.
    pub async fn health(&self) -> HealthReport {
        let checks = self.nodes.iter().map(|n| n.health());
        let per_node: Vec<bool> = futures::future::join_all(checks).await;
        let online_count = per_node.iter().filter(|ok| **ok).count();

        let status = if online_count == self.config.m {
            SystemStatus::Optimal
        } else if online_count >= self.config.k {
            SystemStatus::Degraded
        } else {
            SystemStatus::Critical
        };

        HealthReport { online_count, per_node, status }
    }
}
