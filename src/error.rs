use crate::types::Hash256;
use thiserror::Error;

/// Errors surfaced by the snapshot subsystem.
///
/// Chunk-level failures (`ChunkSizeMismatch`, `ChunkDigestMismatch`) are
/// recoverable: the dispatch layer penalizes the source peer and retries the
/// chunk elsewhere. Store and extraction failures abort the current snapshot
/// attempt. A UTXO hash mismatch rejects the snapshot outright.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("chunk {chunk} out of range (manifest has {count} chunks)")]
    ChunkOutOfRange { chunk: u32, count: u32 },

    #[error("chunk {chunk} size mismatch: expected {expected}, got {got}")]
    ChunkSizeMismatch { chunk: u32, expected: u64, got: u64 },

    #[error("chunk {chunk} digest mismatch: expected {expected}, got {got}")]
    ChunkDigestMismatch {
        chunk: u32,
        expected: Hash256,
        got: Hash256,
    },

    #[error("chunk {chunk} missing from store")]
    ChunkMissing { chunk: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("snapshot extraction failed: {0}")]
    Extraction(String),

    #[error("utxo set hash mismatch at height {height}")]
    UtxoHashMismatch { height: u32 },

    #[error("snapshot download incomplete: {received}/{total} chunks")]
    DownloadIncomplete { received: u32, total: u32 },

    #[error("wire encode: {0}")]
    WireEncode(String),

    #[error("wire decode: {0}")]
    WireDecode(String),
}

impl SnapshotError {
    /// True for failures that should penalize the peer that sent the data
    /// rather than abort the download.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            SnapshotError::ChunkSizeMismatch { .. } | SnapshotError::ChunkDigestMismatch { .. }
        )
    }
}
