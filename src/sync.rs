//! Snapshot message dispatch: the owned service pair the node wires into
//! its network loop.
//!
//! [`SnapshotService`] is the server side (chunk store + rate limiter);
//! [`SnapshotDownloader`] is the client side (chunk store + download state +
//! coordinator). Both are plain handles with lifetimes tied to node
//! init/teardown; there is no process-wide state.
//!
//! Locking discipline: digest verification and disk I/O happen before any
//! scheduler lock is taken, and every critical section here is short.

use crate::chainparams::ChainParams;
use crate::coordinator::DownloadCoordinator;
use crate::error::SnapshotError;
use crate::limiter::{RateLimiter, RateLimiterLimits};
use crate::state::DownloadState;
use crate::store::ChunkStore;
use crate::types::{Hash256, NodeId};
use crate::utxo::{verify_snapshot_utxo_hash, CoinsView};
use crate::wire::{ChunkResponse, GetChunkRequest};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Server side ───────────────────────────────────────────────────────────

pub struct SnapshotService {
    store: Arc<ChunkStore>,
    limiter: RateLimiter,
    accept_inbound: bool,
}

impl SnapshotService {
    pub fn new(
        store: Arc<ChunkStore>,
        limits: RateLimiterLimits,
        accept_inbound: bool,
        now: i64,
    ) -> Self {
        Self { store, limiter: RateLimiter::new(limits, now), accept_inbound }
    }

    /// Handle an incoming chunk request. Returns the response to send, or
    /// `None` when the request is denied or the chunk cannot be served (the
    /// requester only ever sees a missing response, never limiter state).
    pub fn handle_get_chunk(
        &self,
        peer: IpAddr,
        req: &GetChunkRequest,
        now: i64,
    ) -> Option<ChunkResponse> {
        let chunk = req.chunk_number;

        if let Err(reason) = self.limiter.allow_request(peer, chunk, now) {
            debug!(peer = %peer, chunk, %reason, "snapshot request denied");
            return None;
        }

        // Admitted: exactly one complete_transfer from here on.
        let result = self.store.load_chunk(chunk);
        let resp = match result {
            Ok(data) => {
                self.limiter.record_served(peer, chunk, data.len() as u64, now);
                Some(ChunkResponse { chunk_number: chunk, data })
            }
            Err(e) => {
                warn!(peer = %peer, chunk, error = %e, "failed to serve chunk");
                None
            }
        };
        self.limiter.complete_transfer();
        resp
    }

    /// True iff this node should advertise the snapshot-serving service
    /// flag: all chunks on disk and inbound connections accepted.
    pub fn can_serve_snapshots(&self) -> bool {
        self.accept_inbound && self.store.has_all_chunks()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }
}

// ── Client side ───────────────────────────────────────────────────────────

pub struct SnapshotDownloader {
    store: Arc<ChunkStore>,
    state: Mutex<DownloadState>,
    coordinator: Mutex<DownloadCoordinator>,
}

impl SnapshotDownloader {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        let total = store.manifest().chunk_count();
        Self {
            store,
            state: Mutex::new(DownloadState::new(total)),
            coordinator: Mutex::new(DownloadCoordinator::new()),
        }
    }

    /// Schedule chunk requests against the currently available peers.
    /// Called from the node's network loop and periodic timer.
    pub fn next_requests(
        &self,
        available_peers: &[NodeId],
        now: i64,
    ) -> Vec<(NodeId, GetChunkRequest)> {
        let mut state = self.state.lock();
        let mut co = self.coordinator.lock();
        let mut out = Vec::new();
        while let Some((peer, chunk)) = co.select_peer_for_next_chunk(&state, available_peers, now)
        {
            co.record_request(peer, chunk, now);
            state.record_chunk_request(chunk, now);
            out.push((peer, GetChunkRequest { chunk_number: chunk }));
        }
        out
    }

    /// Ingest a chunk response from `peer`.
    ///
    /// Verification and the disk write run before any lock is taken. On a
    /// verified save the peer's failure streak clears and progress advances;
    /// on bad data the peer is penalized and the chunk returns to the pool.
    pub fn handle_chunk(
        &self,
        peer: NodeId,
        resp: &ChunkResponse,
        now: i64,
    ) -> Result<(), SnapshotError> {
        let chunk = resp.chunk_number;
        let count = self.store.manifest().chunk_count();
        if chunk >= count {
            warn!(peer, chunk, count, "chunk response out of range; ignoring");
            return Ok(());
        }
        if self.state.lock().is_chunk_received(chunk) {
            debug!(peer, chunk, "late chunk response; already received");
            return Ok(());
        }

        match self.store.save_chunk(chunk, &resp.data) {
            Ok(()) => {
                self.coordinator.lock().record_success(peer, chunk);
                self.state.lock().mark_chunk_received(chunk, now);
                Ok(())
            }
            Err(e) => {
                self.coordinator.lock().record_failure(peer, chunk, now);
                Err(e)
            }
        }
    }

    /// Periodic timer: expire timed-out requests and put their peers into
    /// backoff. Returns how many requests were expired.
    pub fn on_tick(&self, now: i64) -> usize {
        let mut co = self.coordinator.lock();
        let timed_out = co.timed_out_requests(now);
        let n = timed_out.len();
        for (peer, chunk) in timed_out {
            co.record_failure(peer, chunk, now);
        }
        n
    }

    /// Peer disconnected: drop its state and return its in-flight chunks to
    /// the pool.
    pub fn remove_peer(&self, peer: NodeId) {
        self.coordinator.lock().remove_peer(peer);
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().is_complete()
    }

    /// `(received, total)` chunk counts.
    pub fn progress(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.received_count(), state.total_chunks())
    }

    /// Complete the snapshot: extract the archive under `data_dir`, verify
    /// the resulting UTXO set against the pinned checkpoint, and remove the
    /// chunk directory.
    ///
    /// Extraction and UTXO hashing are long blocking operations; call this
    /// off the network loop.
    pub fn finish<V, P>(
        &self,
        data_dir: &Path,
        view: &V,
        params: &P,
        block_hash: &Hash256,
    ) -> Result<(), SnapshotError>
    where
        V: CoinsView,
        P: ChainParams + ?Sized,
    {
        let (received, total) = self.progress();
        if received != total {
            return Err(SnapshotError::DownloadIncomplete { received, total });
        }

        self.store.extract_snapshot(data_dir)?;

        let height = self.store.manifest().block_height;
        if !verify_snapshot_utxo_hash(view, params, block_hash, height) {
            return Err(SnapshotError::UtxoHashMismatch { height });
        }

        self.store.cleanup_chunks()?;
        info!(height, "snapshot accepted");
        Ok(())
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn store_with(chunks: &[&[u8]]) -> (tempfile::TempDir, Arc<ChunkStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let m = Manifest::from_payload_chunks(9, 0, chunks);
        let store = Arc::new(ChunkStore::initialize(tmp.path(), 9, &m).unwrap());
        (tmp, store)
    }

    fn peer_addr(n: u8) -> IpAddr {
        IpAddr::from([192, 168, 1, n])
    }

    #[test]
    fn service_serves_stored_chunks() {
        let (_tmp, store) = store_with(&[b"aaaa", b"bb"]);
        store.save_chunk(0, b"aaaa").unwrap();
        let svc = SnapshotService::new(store, RateLimiterLimits::default(), true, 0);

        let resp = svc
            .handle_get_chunk(peer_addr(1), &GetChunkRequest { chunk_number: 0 }, 100)
            .unwrap();
        assert_eq!(resp.data, b"aaaa");
        // admission slot released after serving
        assert_eq!(svc.limiter().active_transfers(), 0);
    }

    #[test]
    fn service_returns_none_for_missing_chunk_but_still_releases_slot() {
        let (_tmp, store) = store_with(&[b"aaaa", b"bb"]);
        let svc = SnapshotService::new(store, RateLimiterLimits::default(), true, 0);
        assert!(svc
            .handle_get_chunk(peer_addr(1), &GetChunkRequest { chunk_number: 1 }, 100)
            .is_none());
        assert_eq!(svc.limiter().active_transfers(), 0);
    }

    #[test]
    fn service_denies_rapid_requests() {
        let (_tmp, store) = store_with(&[b"aaaa", b"bb"]);
        store.save_chunk(0, b"aaaa").unwrap();
        store.save_chunk(1, b"bb").unwrap();
        let svc = SnapshotService::new(store, RateLimiterLimits::default(), true, 0);

        assert!(svc
            .handle_get_chunk(peer_addr(1), &GetChunkRequest { chunk_number: 0 }, 100)
            .is_some());
        // 1 second later: under the 2-second server spacing
        assert!(svc
            .handle_get_chunk(peer_addr(1), &GetChunkRequest { chunk_number: 1 }, 101)
            .is_none());
        assert!(svc
            .handle_get_chunk(peer_addr(1), &GetChunkRequest { chunk_number: 1 }, 102)
            .is_some());
    }

    #[test]
    fn can_serve_requires_all_chunks_and_inbound() {
        let (_tmp, store) = store_with(&[b"aaaa", b"bb"]);
        store.save_chunk(0, b"aaaa").unwrap();
        let svc = SnapshotService::new(store.clone(), RateLimiterLimits::default(), true, 0);
        assert!(!svc.can_serve_snapshots());
        store.save_chunk(1, b"bb").unwrap();
        assert!(svc.can_serve_snapshots());

        let not_listening = SnapshotService::new(store, RateLimiterLimits::default(), false, 0);
        assert!(!not_listening.can_serve_snapshots());
    }

    #[test]
    fn downloader_ignores_out_of_range_and_late_chunks() {
        let (_tmp, store) = store_with(&[b"aaaa", b"bb"]);
        let dl = SnapshotDownloader::new(store);

        // out of range: ignored, no penalty
        dl.handle_chunk(1, &ChunkResponse { chunk_number: 9, data: vec![] }, 100)
            .unwrap();

        dl.handle_chunk(1, &ChunkResponse { chunk_number: 0, data: b"aaaa".to_vec() }, 100)
            .unwrap();
        // second arrival of the same chunk is dropped
        dl.handle_chunk(2, &ChunkResponse { chunk_number: 0, data: b"aaaa".to_vec() }, 101)
            .unwrap();
        assert_eq!(dl.progress(), (1, 2));
    }

    #[test]
    fn downloader_penalizes_bad_data() {
        let (_tmp, store) = store_with(&[b"aaaa", b"bb"]);
        let dl = SnapshotDownloader::new(store);

        let reqs = dl.next_requests(&[1], 100);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].1.chunk_number, 0);

        let err = dl
            .handle_chunk(1, &ChunkResponse { chunk_number: 0, data: b"aaab".to_vec() }, 101)
            .unwrap_err();
        assert!(err.is_peer_fault());
        // chunk returned to the pool; another peer picks it up
        let reqs = dl.next_requests(&[2], 104);
        assert_eq!(reqs[0].0, 2);
        assert_eq!(reqs[0].1.chunk_number, 0);
    }
}
