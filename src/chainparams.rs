//! Chain parameters consumed by the snapshot subsystem.
//!
//! The subsystem sees chain parameters through a narrow capability set:
//! pinned snapshot checkpoints plus the two hardcoded manifests (chainstate
//! snapshot and cryptographic parameter files). Variants correspond to
//! mainnet, testnet and regtest.

use crate::manifest::{ChunkInfo, Manifest, SNAPSHOT_CHUNK_SIZE};
use crate::types::Hash256;
use serde::{Deserialize, Serialize};

/// Block height of the current release snapshot.
pub const SNAPSHOT_CURRENT_HEIGHT: u32 = 1_843_200;

/// A pinned `(height, block hash, UTXO digest)` triple.
///
/// A zero `utxo_hash` is a placeholder: verification at that height is
/// skipped until a release pins the real digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCheckpoint {
    pub height: u32,
    pub block_hash: Hash256,
    pub utxo_hash: Hash256,
}

/// The slice of chain parameters the snapshot subsystem depends on.
pub trait ChainParams {
    fn snapshot_checkpoints(&self) -> &[SnapshotCheckpoint];
    /// Manifest of the chainstate snapshot compiled into this release.
    fn hardcoded_manifest(&self) -> Manifest;
    /// Manifest of the cryptographic parameter files (same schema,
    /// different payload).
    fn hardcoded_params_manifest(&self) -> Manifest;
}

fn manifest_from_digest_table(
    height: u32,
    timestamp: u64,
    digests: &[&str],
    last_chunk_size: u64,
) -> Manifest {
    let n = digests.len();
    let chunks: Vec<ChunkInfo> = digests
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let size = if i + 1 == n { last_chunk_size } else { SNAPSHOT_CHUNK_SIZE };
            let digest = Hash256::from_display_hex(s).expect("pinned digest hex");
            ChunkInfo::new(i as u32, digest, size)
        })
        .collect();
    let total_size = chunks.iter().map(|c| c.size).sum();
    Manifest { block_height: height, timestamp, total_size, chunks }
}

// Generated by the snapshot release tooling from `sha256sum chunk-*.dat`.
const MAINNET_SNAPSHOT_DIGESTS: &[&str] = &[
    "e38c36e582ceefdda0a62c0b5d900ae70d656fb08f5f9999ef580dfbd208a23c",
    "d5407180ebec16c81a8e4bf74c9cf7fbdca20b72f45c027667b16f0c83432627",
    "b2a3cf86143db02d419eeaf77fb71bb3c2eaa93944511768afcb3465e486aca4",
    "8e2c6e2fd97573d0954b01ab5824959175b65faa9823cd61af264691aeb5f569",
    "bac389ff47bb8085416559a6732b840121622627263b8c4ddc35889c26eeeb99",
    "cfbbdda3ee7df41091f6386a415d0a0b7cf673aef77112440039f8116146f38f",
    "2508a27d2cbcb2f1140910408d0cc2858c2b027a73c5d43d8b43074f9cd6d044",
    "3b1d1a41aadfb4ba30f4fc206ce6da20531f593276f9f988798ccaf42b6bcd45",
    "5dd3589b6f31bcf8151159e606c6dd9eec8e72e83b75e10eeed46081d5ba6476",
    "58fe81496a9f0b860ecc9286f9cf6419f9289325a8781fa920a806e193ca742a",
    "727c9b44225d35b57bbfdbcaa4becc3a671ff63ac3485d147186898c157302b3",
    "b65c4ffbee3e1f1ab2edb91aa3d37800ccf86442dc0a33fe5d0c06e84181c5b9",
];
const MAINNET_SNAPSHOT_LAST_CHUNK: u64 = 23_607_118;
const MAINNET_SNAPSHOT_TIMESTAMP: u64 = 1_758_240_000;

const MAINNET_PARAMS_DIGESTS: &[&str] = &[
    "4d7616ef6d2a10103d279e7c67445dcb7ff2118a110849179539a23d056b6bf9",
    "1840f59366848a59f44306d51ac82588e6fa59f5fc1293f21eef3244345a3853",
    "6a4faa50032983f53acd1391c8f39bbae90c9acccb5e6a9b94d698cd6f3afabc",
    "5aa5caac0ace9586c909da3dc7724d6670769f60a93f2ba3925bf7ce70a64993",
    "daab4c9149d510611b340f6738abb0017f6f26f3f195e7026e0fc11dc807ad7b",
    "836d492c799d79d5f008247f16c8af62e73849fc0e5a264f455edcf305167de7",
];
const MAINNET_PARAMS_LAST_CHUNK: u64 = 44_139_261;

/// Mainnet parameters.
pub struct MainParams {
    checkpoints: Vec<SnapshotCheckpoint>,
}

impl MainParams {
    pub fn new() -> Self {
        Self {
            checkpoints: vec![SnapshotCheckpoint {
                height: SNAPSHOT_CURRENT_HEIGHT,
                block_hash: Hash256::from_display_hex(
                    "000000000152502fb05c9f429afd294d3c5746b4d063bbcbc8ca883b888f0f35",
                )
                .expect("pinned block hash"),
                // Placeholder until the release pins the serialized UTXO hash.
                utxo_hash: Hash256::zero(),
            }],
        }
    }
}

impl Default for MainParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainParams for MainParams {
    fn snapshot_checkpoints(&self) -> &[SnapshotCheckpoint] {
        &self.checkpoints
    }

    fn hardcoded_manifest(&self) -> Manifest {
        manifest_from_digest_table(
            SNAPSHOT_CURRENT_HEIGHT,
            MAINNET_SNAPSHOT_TIMESTAMP,
            MAINNET_SNAPSHOT_DIGESTS,
            MAINNET_SNAPSHOT_LAST_CHUNK,
        )
    }

    fn hardcoded_params_manifest(&self) -> Manifest {
        // Parameter files are height-independent; the manifest schema still
        // requires a nonzero height, so they are pinned at 1.
        manifest_from_digest_table(
            1,
            MAINNET_SNAPSHOT_TIMESTAMP,
            MAINNET_PARAMS_DIGESTS,
            MAINNET_PARAMS_LAST_CHUNK,
        )
    }
}

const TESTNET_SNAPSHOT_DIGESTS: &[&str] = &[
    "2cea773273b37b21b1b5554b8a0e6f47097da7d0f144eda79a4f2902ed222d91",
    "5c6c09c53bf97aa6c54612288fe3f63183c8cdcbfea7865bee2ae34d7b1bc0cc",
    "a1b3c73ca152502fb05c9f429afd294d3c5746b4d063bbcbc8ca883b888f0f35",
    "2662599e9d9795508668252d5898d920e540ea45b1e735aba825988d9a061270",
];
const TESTNET_SNAPSHOT_HEIGHT: u32 = 912_400;
const TESTNET_SNAPSHOT_LAST_CHUNK: u64 = 9_512_330;

/// Testnet parameters.
pub struct TestParams {
    checkpoints: Vec<SnapshotCheckpoint>,
}

impl TestParams {
    pub fn new() -> Self {
        Self {
            checkpoints: vec![SnapshotCheckpoint {
                height: TESTNET_SNAPSHOT_HEIGHT,
                block_hash: Hash256::from_display_hex(
                    "0000000000e94d1770e238d26b80f5d98220c923326c256b50e8bcf82eaae50a",
                )
                .expect("pinned block hash"),
                utxo_hash: Hash256::zero(),
            }],
        }
    }
}

impl Default for TestParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainParams for TestParams {
    fn snapshot_checkpoints(&self) -> &[SnapshotCheckpoint] {
        &self.checkpoints
    }

    fn hardcoded_manifest(&self) -> Manifest {
        manifest_from_digest_table(
            TESTNET_SNAPSHOT_HEIGHT,
            MAINNET_SNAPSHOT_TIMESTAMP,
            TESTNET_SNAPSHOT_DIGESTS,
            TESTNET_SNAPSHOT_LAST_CHUNK,
        )
    }

    fn hardcoded_params_manifest(&self) -> Manifest {
        manifest_from_digest_table(
            1,
            MAINNET_SNAPSHOT_TIMESTAMP,
            MAINNET_PARAMS_DIGESTS,
            MAINNET_PARAMS_LAST_CHUNK,
        )
    }
}

// Regtest snapshots are regenerated locally, so the "hardcoded" manifest is
// computed over a tiny embedded payload. Digest verification stays real.
const REGTEST_PAYLOAD_CHUNKS: &[&[u8]] = &[b"regtest-chainstate-0", b"regtest-chainstate-1", b"end"];
const REGTEST_PARAMS_CHUNKS: &[&[u8]] = &[b"regtest-params"];

/// Regtest parameters. No checkpoints; verification is always skipped.
pub struct RegtestParams {
    checkpoints: Vec<SnapshotCheckpoint>,
}

impl RegtestParams {
    pub fn new() -> Self {
        Self { checkpoints: Vec::new() }
    }
}

impl Default for RegtestParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainParams for RegtestParams {
    fn snapshot_checkpoints(&self) -> &[SnapshotCheckpoint] {
        &self.checkpoints
    }

    fn hardcoded_manifest(&self) -> Manifest {
        Manifest::from_payload_chunks(1, 0, REGTEST_PAYLOAD_CHUNKS)
    }

    fn hardcoded_params_manifest(&self) -> Manifest {
        Manifest::from_payload_chunks(1, 0, REGTEST_PARAMS_CHUNKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_manifests_are_valid() {
        let p = MainParams::new();
        let m = p.hardcoded_manifest();
        assert!(m.is_valid());
        assert_eq!(m.block_height, SNAPSHOT_CURRENT_HEIGHT);
        assert_eq!(m.chunk_count() as usize, MAINNET_SNAPSHOT_DIGESTS.len());
        assert_eq!(
            m.total_size,
            SNAPSHOT_CHUNK_SIZE * (m.chunk_count() as u64 - 1) + MAINNET_SNAPSHOT_LAST_CHUNK
        );
        assert!(p.hardcoded_params_manifest().is_valid());
    }

    #[test]
    fn testnet_manifest_is_valid() {
        let p = TestParams::new();
        assert!(p.hardcoded_manifest().is_valid());
        assert_eq!(p.snapshot_checkpoints().len(), 1);
        assert!(p.snapshot_checkpoints()[0].utxo_hash.is_zero());
    }

    #[test]
    fn regtest_manifest_verifies_embedded_payload() {
        let m = RegtestParams::new().hardcoded_manifest();
        assert!(m.is_valid());
        for (i, payload) in REGTEST_PAYLOAD_CHUNKS.iter().enumerate() {
            m.verify_chunk(i as u32, payload).unwrap();
        }
    }

    #[test]
    fn mainnet_checkpoint_is_placeholder() {
        let p = MainParams::new();
        let cp = &p.snapshot_checkpoints()[0];
        assert_eq!(cp.height, SNAPSHOT_CURRENT_HEIGHT);
        assert!(cp.utxo_hash.is_zero());
        assert!(!cp.block_hash.is_zero());
    }
}
