//! Client-side download coordinator.
//!
//! Schedules chunk requests across the connected peer set while staying well
//! inside the limits snapshot servers enforce. All operations are short and
//! run under the caller's lock; the coordinator itself never blocks on disk
//! or network I/O.
//!
//! Invariants:
//!   - a chunk appears at most once in the in-flight map (single-flight)
//!   - the in-flight map never contains a received chunk
//!   - per-peer backoff deadlines are monotone across consecutive failures

use crate::state::DownloadState;
use crate::types::NodeId;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Download from several peers at once, but cap in-flight requests.
pub const MAX_CONCURRENT_PEER_REQUESTS: usize = 12;
/// Client-side request spacing per peer. Deliberately above the servers'
/// 2-second minimum so clock skew cannot trip their limiter.
pub const MIN_SECONDS_BETWEEN_REQUESTS: i64 = 3;
/// Give up on an outstanding request after this long.
pub const REQUEST_TIMEOUT_SEC: i64 = 60;

#[derive(Debug, Default, Clone)]
struct PeerDownloadState {
    last_request_time: i64,
    chunks_requested: u32,
    chunks_failed: u32,
    consecutive_failures: u32,
    backoff_until: i64,
}

#[derive(Default)]
pub struct DownloadCoordinator {
    peer_states: HashMap<NodeId, PeerDownloadState>,
    /// Which peer each in-flight chunk was requested from.
    chunk_to_peer: HashMap<u32, NodeId>,
}

impl DownloadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next `(peer, chunk)` pair to request, or `None` when there
    /// is nothing to do right now (complete, chunk already in flight, at the
    /// concurrency cap, or no peer currently eligible).
    ///
    /// Peer choice is least-recently-used among peers that are neither in
    /// backoff nor inside the per-peer spacing window; ties keep the first
    /// peer in input order.
    pub fn select_peer_for_next_chunk(
        &mut self,
        state: &DownloadState,
        available_peers: &[NodeId],
        now: i64,
    ) -> Option<(NodeId, u32)> {
        if available_peers.is_empty() || state.is_complete() {
            return None;
        }

        let chunk = state.next_chunk_to_request();
        if self.chunk_to_peer.contains_key(&chunk) {
            debug!(chunk, "next chunk already in flight");
            return None;
        }
        if self.chunk_to_peer.len() >= MAX_CONCURRENT_PEER_REQUESTS {
            return None;
        }

        let mut best: Option<NodeId> = None;
        let mut oldest_request_time = now;
        for &peer in available_peers {
            let ps = self.peer_states.entry(peer).or_default();
            if ps.backoff_until > now {
                continue;
            }
            if now - ps.last_request_time < MIN_SECONDS_BETWEEN_REQUESTS {
                continue;
            }
            if best.is_none() || ps.last_request_time < oldest_request_time {
                best = Some(peer);
                oldest_request_time = ps.last_request_time;
            }
        }

        best.map(|peer| (peer, chunk))
    }

    /// Record that a request for `chunk` went out to `peer`.
    pub fn record_request(&mut self, peer: NodeId, chunk: u32, now: i64) {
        let ps = self.peer_states.entry(peer).or_default();
        ps.last_request_time = now;
        ps.chunks_requested += 1;
        self.chunk_to_peer.insert(chunk, peer);
        debug!(chunk, peer, "requested chunk");
    }

    /// A verified chunk arrived from `peer`. Clears the peer's failure
    /// streak and releases the in-flight slot. The caller persists the bytes
    /// and marks the download state independently.
    pub fn record_success(&mut self, peer: NodeId, chunk: u32) {
        let ps = self.peer_states.entry(peer).or_default();
        ps.consecutive_failures = 0;
        ps.backoff_until = 0;
        self.chunk_to_peer.remove(&chunk);
        debug!(chunk, peer, "received chunk");
    }

    /// A request failed (timeout or bad data). Applies exponential backoff
    /// and returns the chunk to the pool so another peer can be tried.
    pub fn record_failure(&mut self, peer: NodeId, chunk: u32, now: i64) {
        let ps = self.peer_states.entry(peer).or_default();
        ps.chunks_failed += 1;
        ps.consecutive_failures += 1;

        let backoff = match ps.consecutive_failures {
            0 | 1 => 10,
            2 => 30,
            3 => 60,
            _ => 300,
        };
        ps.backoff_until = now + backoff;
        self.chunk_to_peer.remove(&chunk);

        info!(
            chunk,
            peer,
            failures = ps.consecutive_failures,
            backoff_s = backoff,
            "chunk request failed"
        );
    }

    /// Remaining backoff for a peer in seconds; 0 means ready.
    pub fn peer_backoff(&self, peer: NodeId, now: i64) -> i64 {
        match self.peer_states.get(&peer) {
            Some(ps) if ps.backoff_until > now => ps.backoff_until - now,
            _ => 0,
        }
    }

    /// Sweep in-flight requests whose peer has been silent past the timeout.
    /// Each returned pair has been removed from the in-flight map; the
    /// caller must feed them to [`record_failure`] to apply backoff.
    ///
    /// [`record_failure`]: DownloadCoordinator::record_failure
    pub fn timed_out_requests(&mut self, now: i64) -> Vec<(NodeId, u32)> {
        let mut timed_out = Vec::new();
        let peer_states = &self.peer_states;
        self.chunk_to_peer.retain(|&chunk, &mut peer| {
            if let Some(ps) = peer_states.get(&peer) {
                if now - ps.last_request_time > REQUEST_TIMEOUT_SEC {
                    warn!(chunk, peer, "chunk request timed out");
                    timed_out.push((peer, chunk));
                    return false;
                }
            }
            true
        });
        timed_out
    }

    /// Drop a disconnected peer; its in-flight chunks return to the pool.
    pub fn remove_peer(&mut self, peer: NodeId) {
        self.peer_states.remove(&peer);
        self.chunk_to_peer.retain(|&chunk, &mut p| {
            if p == peer {
                info!(chunk, peer, "peer disconnected with chunk in flight");
                false
            } else {
                true
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.chunk_to_peer.len()
    }
}
