//! Peer-to-peer snapshot distribution for a UTXO chain node.
//!
//! Bootstrapping a node by replaying the whole chain is slow; instead,
//! snapshot-capable peers serve a content-addressed, chunked snapshot of
//! committed chain state at a pinned height. Clients fetch chunks from
//! several peers at once, verify each against the release manifest,
//! reassemble and extract the archive, and check the resulting UTXO set
//! digest against a pinned checkpoint before resuming normal operation.
//!
//! The crate provides the full pipeline: manifest model, on-disk chunk
//! store, client-side download coordination with backoff and timeouts,
//! server-side rate limiting, the wire messages, and the post-extract UTXO
//! hash verification. Transport framing, peer discovery, and the chainstate
//! database itself belong to the host node.

pub mod chainparams;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod manifest;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
pub mod utxo;
pub mod wire;
