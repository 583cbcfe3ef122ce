//! Storage node client
//!
//! A thin HTTP client talking to a single storage node's shard endpoints.
//! Every call squashes transport and status errors down to `bool`/`Option` —
//! the orchestrator treats "node refused" and "node unreachable" identically,
//! as a single fan-out failure, never distinguishing the two.

use std::time::Duration;

const IO_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Address and reqwest client for one storage node.
#[derive(Clone)]
pub struct NodeClient {
    base_url: String,
    io_client: reqwest::Client,
    probe_client: reqwest::Client,
}

impl NodeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(base_url, IO_TIMEOUT, PROBE_TIMEOUT)
    }

    /// Like [`NodeClient::new`] but with timeouts overridden by
    /// `OrchestratorConfig` rather than the crate defaults.
    pub fn with_timeouts(base_url: impl Into<String>, io_timeout: Duration, probe_timeout: Duration) -> Self {
        let io_client = reqwest::Client::builder()
            .timeout(io_timeout)
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        let probe_client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .expect("reqwest client with a fixed timeout always builds");

        Self {
            base_url: base_url.into(),
            io_client,
            probe_client,
        }
    }

    /// `"{filename}_shard_{i}"` — the shard storage identifier shared by the
    /// upload and download paths.
    pub fn shard_storage_id(filename: &str, shard_id: usize) -> String {
        format!("{filename}_shard_{shard_id}")
    }

    /// Upload one shard. `true` only on a 2xx response; any transport error
    /// or non-2xx status is `false` — the orchestrator does not need to know
    /// why a put failed, only that it did.
    pub async fn upload(&self, shard_storage_id: &str, data: Vec<u8>) -> bool {
        match self
            .io_client
            .put(format!("{}/store/{}", self.base_url, shard_storage_id))
            .body(data)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(node = %self.base_url, shard_storage_id, error = %e, "shard upload failed");
                false
            }
        }
    }

    /// Download one shard. `None` on 404 or any transport/status error.
    pub async fn download(&self, shard_storage_id: &str) -> Option<Vec<u8>> {
        let resp = match self
            .io_client
            .get(format!("{}/retrieve/{}", self.base_url, shard_storage_id))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(node = %self.base_url, shard_storage_id, error = %e, "shard download failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            return None;
        }

        resp.bytes().await.ok().map(|b| b.to_vec())
    }

    /// Delete one shard. `true` on success or on 404 (already gone) — delete
    /// is idempotent, a rollback calling it twice is not an error.
    pub async fn delete(&self, shard_storage_id: &str) -> bool {
        match self
            .probe_client
            .delete(format!("{}/delete/{}", self.base_url, shard_storage_id))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND,
            Err(e) => {
                tracing::warn!(node = %self.base_url, shard_storage_id, error = %e, "shard delete failed");
                false
            }
        }
    }

    /// Liveness probe. `true` only on a 2xx response within the short probe
    /// timeout; any error, timeout, or non-2xx status is `false`.
    pub async fn health(&self) -> bool {
        match self.probe_client.get(format!("{}/health", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
