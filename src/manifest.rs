//! Snapshot manifest: the pinned description of a chunked snapshot.
//!
//! A snapshot is a tar.gz archive of committed chain state at a fixed block
//! height, cut into fixed-size chunks. The manifest pins the height, the
//! total archive size, and one SHA-256 digest per chunk. Manifests ship
//! compiled into the binary (per release) and are also persisted next to the
//! chunk files as `manifest.dat`.

use crate::error::SnapshotError;
use crate::types::{chunk_digest, Hash256};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fixed chunk size: 50 MiB. Only the last chunk of a snapshot may be
/// smaller, and it is never empty.
pub const SNAPSHOT_CHUNK_SIZE: u64 = 52_428_800;

/// Information about a single snapshot chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub chunk_number: u32,
    /// SHA-256 of the chunk bytes, stored in the internal layout
    /// (byte-reversed `sha256sum` output).
    pub digest: Hash256,
    /// Exact payload size in bytes.
    pub size: u64,
}

impl ChunkInfo {
    pub fn new(chunk_number: u32, digest: Hash256, size: u64) -> Self {
        Self { chunk_number, digest, size }
    }
}

/// Complete snapshot manifest.
///
/// Field order is the on-disk and wire order: `block_height:u32,
/// timestamp:u64, total_size:u64, chunks:vec<ChunkInfo>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub block_height: u32,
    /// Unix timestamp of snapshot creation.
    pub timestamp: u64,
    /// Total uncompressed size of the combined archive in bytes.
    pub total_size: u64,
    pub chunks: Vec<ChunkInfo>,
}

impl Manifest {
    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// A manifest is valid iff height > 0, chunks non-empty, total size > 0,
    /// and chunk numbers are dense `0..N-1`.
    pub fn is_valid(&self) -> bool {
        if self.block_height == 0 {
            return false;
        }
        if self.chunks.is_empty() {
            return false;
        }
        if self.total_size == 0 {
            return false;
        }
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.chunk_number != i as u32 {
                warn!(
                    index = i,
                    chunk_number = chunk.chunk_number,
                    "manifest chunk has wrong number"
                );
                return false;
            }
        }
        true
    }

    /// Verify chunk bytes against the pinned digest and size.
    pub fn verify_chunk(&self, chunk: u32, data: &[u8]) -> Result<(), SnapshotError> {
        let info = self
            .chunks
            .get(chunk as usize)
            .ok_or(SnapshotError::ChunkOutOfRange { chunk, count: self.chunk_count() })?;

        if data.len() as u64 != info.size {
            return Err(SnapshotError::ChunkSizeMismatch {
                chunk,
                expected: info.size,
                got: data.len() as u64,
            });
        }

        let got = chunk_digest(data);
        if got != info.digest {
            return Err(SnapshotError::ChunkDigestMismatch {
                chunk,
                expected: info.digest,
                got,
            });
        }

        Ok(())
    }

    /// Serialize in the fixed on-disk field order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        bincode::serialize(self).map_err(|e| SnapshotError::WireEncode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        bincode::deserialize(bytes).map_err(|e| SnapshotError::WireDecode(e.to_string()))
    }

    /// Build a manifest over in-memory payload chunks, computing digests.
    /// Used by regtest params and tests; release manifests are pinned tables.
    pub fn from_payload_chunks(height: u32, timestamp: u64, chunks: &[&[u8]]) -> Self {
        let infos: Vec<ChunkInfo> = chunks
            .iter()
            .enumerate()
            .map(|(i, data)| ChunkInfo::new(i as u32, chunk_digest(data), data.len() as u64))
            .collect();
        let total_size = infos.iter().map(|c| c.size).sum();
        Self { block_height: height, timestamp, total_size, chunks: infos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_manifest() -> Manifest {
        Manifest::from_payload_chunks(100, 1_700_000_000, &[b"aaaa", b"bbbb", b"cc"])
    }

    #[test]
    fn valid_manifest_accepted() {
        let m = small_manifest();
        assert!(m.is_valid());
        assert_eq!(m.chunk_count(), 3);
        assert_eq!(m.total_size, 10);
    }

    #[test]
    fn invalid_manifests_rejected() {
        let mut m = small_manifest();
        m.block_height = 0;
        assert!(!m.is_valid());

        let mut m = small_manifest();
        m.chunks.clear();
        assert!(!m.is_valid());

        let mut m = small_manifest();
        m.total_size = 0;
        assert!(!m.is_valid());

        let mut m = small_manifest();
        m.chunks[1].chunk_number = 5;
        assert!(!m.is_valid());
    }

    #[test]
    fn verify_chunk_accepts_exact_bytes() {
        let m = small_manifest();
        assert!(m.verify_chunk(0, b"aaaa").is_ok());
        assert!(m.verify_chunk(2, b"cc").is_ok());
    }

    #[test]
    fn verify_chunk_rejects_size_and_digest_mismatch() {
        let m = small_manifest();
        assert!(matches!(
            m.verify_chunk(0, b"aaa"),
            Err(SnapshotError::ChunkSizeMismatch { chunk: 0, expected: 4, got: 3 })
        ));
        assert!(matches!(
            m.verify_chunk(0, b"aaab"),
            Err(SnapshotError::ChunkDigestMismatch { chunk: 0, .. })
        ));
        assert!(matches!(
            m.verify_chunk(9, b"aaaa"),
            Err(SnapshotError::ChunkOutOfRange { chunk: 9, count: 3 })
        ));
    }

    #[test]
    fn digest_byte_order_pinned() {
        // sha256("abc") as printed by sha256sum; the manifest stores the
        // byte-reversed form and verification must accept the raw bytes.
        let digest = Hash256::from_display_hex(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        )
        .unwrap();
        let m = Manifest {
            block_height: 1,
            timestamp: 0,
            total_size: 3,
            chunks: vec![ChunkInfo::new(0, digest, 3)],
        };
        assert!(m.verify_chunk(0, b"abc").is_ok());

        // Storing the un-reversed digest must fail verification.
        let mut raw = digest.0;
        raw.reverse();
        let m_bad = Manifest {
            block_height: 1,
            timestamp: 0,
            total_size: 3,
            chunks: vec![ChunkInfo::new(0, Hash256(raw), 3)],
        };
        assert!(m_bad.verify_chunk(0, b"abc").is_err());
    }

    #[test]
    fn serialize_roundtrip_is_bitwise() {
        let m = small_manifest();
        let bytes = m.to_bytes().unwrap();
        let back = Manifest::from_bytes(&bytes).unwrap();
        assert_eq!(m, back);
        assert_eq!(bytes, back.to_bytes().unwrap());
    }
}
