//! Snapshot wire messages.
//!
//! Two framed messages ride the host transport's length-prefixed streams:
//! a chunk request and its response. Payloads are bincode in declaration
//! order; the protocol carries no version field because manifests are pinned
//! per release.

use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};

/// Stream protocol id for the host transport to register.
pub const PROTOCOL_ID: &str = "/snapsync/chunk/1.0.0";

/// Hard cap on an encoded message: one chunk plus framing slack.
pub const MAX_MSG_SIZE: usize = 64 * 1024 * 1024;

/// Request one snapshot chunk by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChunkRequest {
    pub chunk_number: u32,
}

/// Chunk payload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub chunk_number: u32,
    pub data: Vec<u8>,
}

/// Requests carried on [`PROTOCOL_ID`]. Single-variant today; receivers
/// ignore variants they do not understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SnapshotReq {
    GetChunk(GetChunkRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SnapshotResp {
    Chunk(ChunkResponse),
}

pub fn encode_request(req: &SnapshotReq) -> Result<Vec<u8>, SnapshotError> {
    bincode::serialize(req).map_err(|e| SnapshotError::WireEncode(e.to_string()))
}

pub fn decode_request(bytes: &[u8]) -> Result<SnapshotReq, SnapshotError> {
    if bytes.len() > MAX_MSG_SIZE {
        return Err(SnapshotError::WireDecode("request too large".into()));
    }
    bincode::deserialize(bytes).map_err(|e| SnapshotError::WireDecode(e.to_string()))
}

pub fn encode_response(resp: &SnapshotResp) -> Result<Vec<u8>, SnapshotError> {
    bincode::serialize(resp).map_err(|e| SnapshotError::WireEncode(e.to_string()))
}

pub fn decode_response(bytes: &[u8]) -> Result<SnapshotResp, SnapshotError> {
    if bytes.len() > MAX_MSG_SIZE {
        return Err(SnapshotError::WireDecode("response too large".into()));
    }
    bincode::deserialize(bytes).map_err(|e| SnapshotError::WireDecode(e.to_string()))
}
