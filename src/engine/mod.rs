//! Crypto-Erasure Engine
//!
//! A stateless-per-call transformation between plaintext and shard set.
//! `encrypt_and_shard` and `recover_and_decrypt` are the only two operations;
//! neither holds state across calls and neither touches the filesystem or
//! the network. The per-file key is always an output, never a field — two
//! concurrent uploads calling the engine never race over shared key state.

pub mod crypto;
pub mod erasure;
pub mod hashing;

pub use crypto::{CryptoError, FileKey, MasterKey};
pub use erasure::CodeParams;

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("erasure coding failure: {0}")]
    Code(String),

    #[error("empty plaintext is rejected")]
    Empty,

    #[error("not enough shards: have {have}, need {need}")]
    Insufficient { have: usize, need: usize },

    #[error("tampering detected: {0}")]
    Tampered(TamperedContext),
}

/// Identifies which integrity check failed, for precise error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TamperedContext {
    Shard(usize),
    WholeFile,
}

impl std::fmt::Display for TamperedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TamperedContext::Shard(id) => write!(f, "shard {id}"),
            TamperedContext::WholeFile => write!(f, "whole file"),
        }
    }
}

/// Output of [`encrypt_and_shard`]: everything the orchestrator needs to
/// distribute shards and build a manifest, and nothing the engine retains.
pub struct EncodedFile {
    pub shards: Vec<erasure::Shard>,
    pub shard_hashes: HashMap<usize, String>,
    pub file_key: FileKey,
    pub whole_file_hash: String,
    pub ciphertext_len: usize,
}

/// Encrypt `plaintext` under a freshly generated per-file key, then erasure
/// code the ciphertext. Encryption strictly precedes sharding: there is no
/// code path that shards plaintext instead of ciphertext.
pub fn encrypt_and_shard(plaintext: &[u8], params: CodeParams) -> Result<EncodedFile, EngineError> {
    if plaintext.is_empty() {
        return Err(EngineError::Empty);
    }

    let whole_file_hash = hashing::sha256_hex(plaintext);

    let file_key = FileKey::generate();
    let ciphertext = file_key.encrypt(plaintext);

    let shards = erasure::encode(&ciphertext, params)?;

    let shard_hashes = shards
        .iter()
        .map(|s| (s.shard_id, hashing::sha256_hex(&s.data)))
        .collect();

    tracing::debug!(
        plaintext_len = plaintext.len(),
        ciphertext_len = ciphertext.len(),
        shard_count = shards.len(),
        k = params.k,
        m = params.m,
        "encrypted and sharded"
    );

    Ok(EncodedFile {
        shards,
        shard_hashes,
        file_key,
        whole_file_hash,
        ciphertext_len: ciphertext.len(),
    })
}

/// Reconstruct and decrypt plaintext from available shards, verifying
/// integrity at every step. Tamper checks run before any reconstruction or
/// decryption is attempted — a single corrupted shard is reported by its
/// `shard_id`, never silently repaired or ignored.
///
/// The Fernet token length is not carried in the manifest; it is recovered
/// deterministically from `expected_size` via [`crypto::fernet_token_len`]
/// rather than adding a field to the closed manifest schema.
pub fn recover_and_decrypt(
    available_shards: &[(usize, Vec<u8>)],
    shard_hashes_from_manifest: &HashMap<usize, String>,
    file_key: &FileKey,
    expected_whole_file_hash: &str,
    expected_size: usize,
    params: CodeParams,
) -> Result<Vec<u8>, EngineError> {
    if available_shards.len() < params.k {
        return Err(EngineError::Insufficient {
            have: available_shards.len(),
            need: params.k,
        });
    }

    for (shard_id, bytes) in available_shards {
        let expected = shard_hashes_from_manifest
            .get(shard_id)
            .ok_or(EngineError::Tampered(TamperedContext::Shard(*shard_id)))?;
        if !hashing::verify_sha256_hex(bytes, expected) {
            return Err(EngineError::Tampered(TamperedContext::Shard(*shard_id)));
        }
    }

    let ciphertext_len = crypto::fernet_token_len(expected_size);
    let ciphertext = erasure::decode(available_shards, params, ciphertext_len)?;

    let plaintext = file_key
        .decrypt(&ciphertext)
        .map_err(|_| EngineError::Tampered(TamperedContext::WholeFile))?;

    let mut plaintext = plaintext;
    plaintext.truncate(expected_size);

    if hashing::sha256_hex(&plaintext) != expected_whole_file_hash {
        return Err(EngineError::Tampered(TamperedContext::WholeFile));
    }

    tracing::debug!(
        shards_used = available_shards.len(),
        plaintext_len = plaintext.len(),
        k = params.k,
        m = params.m,
        "reconstructed and decrypted"
    );

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_available(shards: &[erasure::Shard]) -> Vec<(usize, Vec<u8>)> {
        shards
            .iter()
            .map(|s| (s.shard_id, s.data.clone()))
            .collect()
    }

    #[test]
    fn empty_plaintext_is_rejected() {
        let err = encrypt_and_shard(b"", CodeParams::default()).unwrap_err();
        assert!(matches!(err, EngineError::Empty));
    }

    #[test]
    fn round_trip_with_all_shards() {
        let plaintext = b"hello world";
        let params = CodeParams::default();
        let encoded = encrypt_and_shard(plaintext, params).unwrap();

        let available = to_available(&encoded.shards);
        let recovered = recover_and_decrypt(
            &available,
            &encoded.shard_hashes,
            &encoded.file_key,
            &encoded.whole_file_hash,
            plaintext.len(),
            params,
        )
        .unwrap();

        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn round_trip_with_exactly_k_shards() {
        let plaintext: Vec<u8> = (0..50_000).map(|i| (i % 251) as u8).collect();
        let params = CodeParams::default();
        let encoded = encrypt_and_shard(&plaintext, params).unwrap();

        let available: Vec<(usize, Vec<u8>)> = to_available(&encoded.shards)
            .into_iter()
            .skip(1)
            .take(params.k)
            .collect();

        let recovered = recover_and_decrypt(
            &available,
            &encoded.shard_hashes,
            &encoded.file_key,
            &encoded.whole_file_hash,
            plaintext.len(),
            params,
        )
        .unwrap();

        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn fewer_than_k_shards_is_insufficient() {
        let plaintext = b"hello world";
        let params = CodeParams::default();
        let encoded = encrypt_and_shard(plaintext, params).unwrap();

        let available: Vec<(usize, Vec<u8>)> =
            to_available(&encoded.shards).into_iter().take(params.k - 1).collect();

        let err = recover_and_decrypt(
            &available,
            &encoded.shard_hashes,
            &encoded.file_key,
            &encoded.whole_file_hash,
            plaintext.len(),
            params,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Insufficient { have, need } if have == params.k - 1 && need == params.k
        ));
    }

    #[test]
    fn single_byte_flip_is_detected_on_the_right_shard() {
        let plaintext = b"The quick brown fox jumps over the lazy dog.";
        let params = CodeParams::default();
        let encoded = encrypt_and_shard(plaintext, params).unwrap();

        let mut available = to_available(&encoded.shards);
        let tampered_id = available[2].0;
        available[2].1[0] ^= 0xFF;

        let err = recover_and_decrypt(
            &available,
            &encoded.shard_hashes,
            &encoded.file_key,
            &encoded.whole_file_hash,
            plaintext.len(),
            params,
        )
        .unwrap_err();

        assert_eq!(err.to_string(), EngineError::Tampered(TamperedContext::Shard(tampered_id)).to_string());
    }

    #[test]
    fn wrong_file_key_is_tampered_not_garbage() {
        let plaintext = b"secret payload";
        let params = CodeParams::default();
        let encoded = encrypt_and_shard(plaintext, params).unwrap();
        let wrong_key = FileKey::generate();

        let available = to_available(&encoded.shards);
        let err = recover_and_decrypt(
            &available,
            &encoded.shard_hashes,
            &wrong_key,
            &encoded.whole_file_hash,
            plaintext.len(),
            params,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::Tampered(TamperedContext::WholeFile)));
    }

    #[test]
    fn ordering_ciphertext_hash_never_equals_plaintext_hash() {
        let plaintext = b"ordering invariant payload";
        let params = CodeParams::default();
        let encoded = encrypt_and_shard(plaintext, params).unwrap();

        // Reconstruct the ciphertext from all shards and confirm its hash
        // differs from the plaintext hash (proves encrypt-before-shard).
        let available = to_available(&encoded.shards);
        let ciphertext = erasure::decode(&available, params, encoded.ciphertext_len).unwrap();

        assert_ne!(hashing::sha256_hex(&ciphertext), encoded.whole_file_hash);
    }
}

/// Quantified properties from the engine's contract: round-trip, threshold
/// sufficiency/necessity, and tamper detection, over arbitrary plaintexts
/// and arbitrary k-sized subsets of shards. Pure engine-level, no I/O.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::vec as pvec;
    use proptest::prelude::*;

    fn to_available(shards: &[erasure::Shard]) -> Vec<(usize, Vec<u8>)> {
        shards.iter().map(|s| (s.shard_id, s.data.clone())).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn round_trip_holds_for_arbitrary_plaintext(plaintext in pvec(any::<u8>(), 1..4096)) {
            let params = CodeParams::default();
            let encoded = encrypt_and_shard(&plaintext, params).unwrap();
            let available = to_available(&encoded.shards);

            let recovered = recover_and_decrypt(
                &available,
                &encoded.shard_hashes,
                &encoded.file_key,
                &encoded.whole_file_hash,
                plaintext.len(),
                params,
            ).unwrap();

            prop_assert_eq!(recovered, plaintext);
        }

        #[test]
        fn any_k_of_m_subset_reconstructs(
            plaintext in pvec(any::<u8>(), 1..4096),
            drop_a in 0usize..5,
            drop_b in 0usize..5,
        ) {
            let params = CodeParams::default();
            let encoded = encrypt_and_shard(&plaintext, params).unwrap();

            let mut drop = [drop_a, drop_b];
            drop.sort_unstable();
            prop_assume!(drop[0] != drop[1]);

            let available: Vec<(usize, Vec<u8>)> = to_available(&encoded.shards)
                .into_iter()
                .filter(|(id, _)| *id != drop[0] && *id != drop[1])
                .collect();
            prop_assert_eq!(available.len(), params.k);

            let recovered = recover_and_decrypt(
                &available,
                &encoded.shard_hashes,
                &encoded.file_key,
                &encoded.whole_file_hash,
                plaintext.len(),
                params,
            ).unwrap();

            prop_assert_eq!(recovered, plaintext);
        }

        #[test]
        fn fewer_than_k_never_silently_succeeds(
            plaintext in pvec(any::<u8>(), 1..4096),
            keep in 0usize..3,
        ) {
            let params = CodeParams::default();
            let encoded = encrypt_and_shard(&plaintext, params).unwrap();

            let available: Vec<(usize, Vec<u8>)> = to_available(&encoded.shards).into_iter().take(keep).collect();

            let result = recover_and_decrypt(
                &available,
                &encoded.shard_hashes,
                &encoded.file_key,
                &encoded.whole_file_hash,
                plaintext.len(),
                params,
            );

            prop_assert!(matches!(result, Err(EngineError::Insufficient { have, need }) if have == keep && need == params.k));
        }

        #[test]
        fn any_single_byte_flip_is_caught_as_tampered(
            plaintext in pvec(any::<u8>(), 16..4096),
            shard_index in 0usize..5,
            byte_index in 0usize..64,
        ) {
            let params = CodeParams::default();
            let encoded = encrypt_and_shard(&plaintext, params).unwrap();

            let mut available = to_available(&encoded.shards);
            let shard = &mut available[shard_index];
            let i = byte_index % shard.1.len();
            shard.1[i] ^= 0xFF;

            let result = recover_and_decrypt(
                &available,
                &encoded.shard_hashes,
                &encoded.file_key,
                &encoded.whole_file_hash,
                plaintext.len(),
                params,
            );

            prop_assert!(matches!(result, Err(EngineError::Tampered(_))));
        }

        #[test]
        fn ciphertext_hash_never_equals_plaintext_hash(plaintext in pvec(any::<u8>(), 1..4096)) {
            let params = CodeParams::default();
            let encoded = encrypt_and_shard(&plaintext, params).unwrap();
            let available = to_available(&encoded.shards);
            let ciphertext = erasure::decode(&available, params, encoded.ciphertext_len).unwrap();

            prop_assert_ne!(hashing::sha256_hex(&ciphertext), encoded.whole_file_hash);
        }
    }
}
