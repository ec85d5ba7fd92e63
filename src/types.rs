use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier the network layer assigns to a connected peer.
pub type NodeId = u64;

/// 256-bit digest stored in the internal little-endian integer layout.
///
/// External tooling (`sha256sum`) emits big-endian hex; the internal layout
/// is the byte reversal of that. All conversions between the two conventions
/// go through [`Hash256::from_sha256_output`] and [`Hash256::from_display_hex`]
/// so the reversal lives in exactly one place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Convert raw SHA-256 output (big-endian) into the internal layout.
    pub fn from_sha256_output(raw: [u8; 32]) -> Self {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = raw[31 - i];
        }
        Self(out)
    }

    /// Parse a digest from its display form (big-endian hex, the form
    /// `sha256sum` prints). Returns `None` for anything that is not exactly
    /// 64 hex characters.
    pub fn from_display_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let raw: [u8; 32] = bytes.try_into().ok()?;
        Some(Self::from_sha256_output(raw))
    }

    /// Big-endian hex, matching external tool output.
    pub fn display_hex(&self) -> String {
        let mut raw = [0u8; 32];
        for i in 0..32 {
            raw[i] = self.0[31 - i];
        }
        hex::encode(raw)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_hex())
    }
}

/// Single-pass SHA-256 over raw chunk bytes, stored in the internal layout.
///
/// Not the doubled hash used for block ids; manifest digests come from
/// `sha256sum` over the chunk files.
pub fn chunk_digest(data: &[u8]) -> Hash256 {
    let raw: [u8; 32] = Sha256::digest(data).into();
    Hash256::from_sha256_output(raw)
}

/// Current wall-clock time as Unix seconds.
pub fn unix_time_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
