//! Erasure coding using Reed-Solomon
//!
//! Splits ciphertext into `m` shards where any `k` suffice to reconstruct.
//! `k` data shards carry the (padded) ciphertext directly; `m - k` parity
//! shards are computed by the coder. This is a systematic code: shards
//! `0..k` are exactly the padded ciphertext, unchanged by encoding.

use super::EngineError;
use reed_solomon_erasure::galois_8::ReedSolomon;

/// Erasure code parameters. `k` is the reconstruction threshold, `m` the
/// total shard count. Invariant: `1 <= k <= m`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CodeParams {
    pub k: usize,
    pub m: usize,
}

impl CodeParams {
    pub fn new(k: usize, m: usize) -> Self {
        Self { k, m }
    }

    pub fn parity_shards(&self) -> usize {
        self.m - self.k
    }
}

impl Default for CodeParams {
    fn default() -> Self {
        Self { k: 3, m: 5 }
    }
}

/// A single erasure-coded shard.
#[derive(Debug, Clone)]
pub struct Shard {
    pub shard_id: usize,
    pub data: Vec<u8>,
}

/// Split `ciphertext` into `params.m` shards, any `params.k` of which
/// reconstruct it exactly. Returns shards in index order (`shard_id` equals
/// the vector position).
pub fn encode(ciphertext: &[u8], params: CodeParams) -> Result<Vec<Shard>, EngineError> {
    let rs = ReedSolomon::new(params.k, params.parity_shards())
        .map_err(|e| EngineError::Code(e.to_string()))?;

    let shard_size = (ciphertext.len() + params.k - 1) / params.k;
    let shard_size = shard_size.max(1);

    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(params.m);
    for i in 0..params.k {
        let start = i * shard_size;
        let end = (start + shard_size).min(ciphertext.len());
        let mut shard = if start < ciphertext.len() {
            ciphertext[start..end].to_vec()
        } else {
            Vec::new()
        };
        shard.resize(shard_size, 0);
        shards.push(shard);
    }
    for _ in 0..params.parity_shards() {
        shards.push(vec![0u8; shard_size]);
    }

    let mut shard_refs: Vec<&mut [u8]> = shards.iter_mut().map(|s| s.as_mut_slice()).collect();
    rs.encode(&mut shard_refs)
        .map_err(|e| EngineError::Code(e.to_string()))?;

    Ok(shards
        .into_iter()
        .enumerate()
        .map(|(shard_id, data)| Shard { shard_id, data })
        .collect())
}

/// Reconstruct the ciphertext from `available` shards (any `>= k` of the
/// `m`, identified by their `shard_id`), truncated to `ciphertext_len`.
pub fn decode(
    available: &[(usize, Vec<u8>)],
    params: CodeParams,
    ciphertext_len: usize,
) -> Result<Vec<u8>, EngineError> {
    if available.len() < params.k {
        return Err(EngineError::Insufficient {
            have: available.len(),
            need: params.k,
        });
    }

    let rs = ReedSolomon::new(params.k, params.parity_shards())
        .map_err(|e| EngineError::Code(e.to_string()))?;

    let shard_size = available
        .first()
        .map(|(_, d)| d.len())
        .ok_or_else(|| EngineError::Code("no shards available".into()))?;

    let mut slots: Vec<Option<Vec<u8>>> = vec![None; params.m];
    for (shard_id, data) in available {
        if *shard_id < params.m {
            slots[*shard_id] = Some(data.clone());
        }
    }

    rs.reconstruct(&mut slots)
        .map_err(|e| EngineError::Code(e.to_string()))?;

    let mut result = Vec::with_capacity(params.k * shard_size);
    for slot in slots.into_iter().take(params.k) {
        match slot {
            Some(data) => result.extend_from_slice(&data),
            None => {
                return Err(EngineError::Code(
                    "reconstruction left a data shard empty".into(),
                ))
            }
        }
    }

    result.truncate(ciphertext_len);
    Ok(result)
}
