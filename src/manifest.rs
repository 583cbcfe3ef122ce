//! The file manifest: closed schema, one sealed copy per stored object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Replaces `encryption_key` in any externally visible rendering of a
/// manifest. Fixed and well-known so a redacted manifest is trivially
/// recognisable in logs or HTTP responses.
pub const REDACTED_KEY_SENTINEL: &str = "<redacted>";

/// The manifest for one stored file. Closed schema — no field beyond these
/// nine is ever added; a new concern gets its own structure, not a bag
/// tacked onto this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub filename: String,
    pub file_hash: String,
    pub file_size: usize,
    pub encryption_key: String,
    pub k_required: usize,
    pub m_total: usize,
    /// `shard_id -> hex(sha256(shard_bytes))`.
    pub shard_metadata: HashMap<usize, String>,
    pub upload_date: String,
    /// `shard_id -> node_url` the shard was delivered to.
    pub shard_locations: HashMap<usize, String>,
}

impl Manifest {
    /// Redacted view: safe to log, return over HTTP, or list. The only
    /// form external interfaces are permitted to see.
    pub fn view_public(&self) -> Manifest {
        let mut redacted = self.clone();
        redacted.encryption_key = REDACTED_KEY_SENTINEL.to_string();
        redacted
    }

    /// Full, unredacted view, including `encryption_key`. For the
    /// orchestrator's own use in reconstructing a file — never exposed
    /// across an external interface.
    pub fn use_internal(&self) -> &Manifest {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest {
            filename: "report.pdf".to_string(),
            file_hash: "abc123".to_string(),
            file_size: 11,
            encryption_key: "super-secret-fernet-key".to_string(),
            k_required: 3,
            m_total: 5,
            shard_metadata: HashMap::from([(0, "hash0".to_string())]),
            upload_date: "2026-07-27T00:00:00Z".to_string(),
            shard_locations: HashMap::from([(0, "http://node0".to_string())]),
        }
    }

    #[test]
    fn view_public_redacts_the_key_and_nothing_else() {
        let m = sample();
        let redacted = m.view_public();
        assert_eq!(redacted.encryption_key, REDACTED_KEY_SENTINEL);
        assert_eq!(redacted.filename, m.filename);
        assert_eq!(redacted.shard_metadata, m.shard_metadata);
    }

    #[test]
    fn view_public_never_contains_the_original_key() {
        let m = sample();
        let json = serde_json::to_string(&m.view_public()).unwrap();
        assert!(!json.contains("super-secret-fernet-key"));
    }

    #[test]
    fn use_internal_keeps_the_real_key() {
        let m = sample();
        assert_eq!(m.use_internal().encryption_key, m.encryption_key);
    }

    #[test]
    fn round_trips_through_json() {
        let m = sample();
        let json = serde_json::to_string(&m).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
