//! Server-side rate limiting for snapshot chunk serving.
//!
//! Protects a snapshot-serving node against abusive requesters while staying
//! generous enough for honest bootstrap traffic: per-peer sliding-window
//! accounting, a global concurrency cap, duplicate-serve suppression, and a
//! soft ban that clears itself once the ban window passes.
//!
//! Per-peer state machine: Normal -> Throttled -> Banned -> Normal. The
//! throttle is implicit (requests are denied until the 60-second window
//! frees slots); the ban fires when the window length reaches the ban
//! threshold during a denial; the unban is lazy, on the first admission
//! attempt after `ban_until`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Sliding window over which per-peer requests are counted.
const REQUEST_WINDOW_S: i64 = 60;
/// Evict peers idle longer than this (unless banned).
const PEER_IDLE_EVICT_S: i64 = 600;
/// Log and reset the bytes-served counter this often.
const BYTES_LOG_INTERVAL_S: i64 = 3600;

/// Admission limits. Defaults are deliberately generous: they exist to stop
/// floods, not to slow down honest bootstrapping nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterLimits {
    /// Max chunks per peer within the 60-second window.
    pub max_chunks_per_peer_per_minute: u32,
    /// Max simultaneous transfers across all peers.
    pub max_concurrent_transfers: u32,
    /// Minimum spacing between requests from one peer.
    pub min_seconds_between_requests: i64,
    /// Window during which re-serving the same chunk to a peer is refused.
    pub duplicate_chunk_window_s: i64,
    /// Window length at which a peer is banned outright.
    pub ban_threshold: u32,
    pub ban_duration_s: i64,
}

impl Default for RateLimiterLimits {
    fn default() -> Self {
        Self {
            max_chunks_per_peer_per_minute: 30,
            max_concurrent_transfers: 25,
            min_seconds_between_requests: 2,
            duplicate_chunk_window_s: 300,
            ban_threshold: 100,
            ban_duration_s: 300,
        }
    }
}

/// Why a request was denied. `Display` gives the reason string reported to
/// logs; limiter internals never leak onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Banned { until: i64 },
    AtCapacity { max_concurrent: u32 },
    TooFast { wait_s: i64 },
    DuplicateChunk { chunk: u32, served_ago_s: i64 },
    RateLimited { max_per_minute: u32 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Banned { until } => write!(f, "peer banned until {until}"),
            Self::AtCapacity { max_concurrent } => {
                write!(f, "server at capacity ({max_concurrent} concurrent transfers)")
            }
            Self::TooFast { wait_s } => {
                write!(f, "too fast - wait {wait_s} seconds between requests")
            }
            Self::DuplicateChunk { chunk, served_ago_s } => {
                write!(f, "already served chunk {chunk} {served_ago_s} seconds ago")
            }
            Self::RateLimited { max_per_minute } => {
                write!(f, "rate limit: max {max_per_minute} chunks per minute")
            }
        }
    }
}

#[derive(Debug, Default)]
struct PeerRequestInfo {
    request_times: VecDeque<i64>,
    served_chunks: HashMap<u32, i64>,
    last_request_time: i64,
    total_requests: u32,
    banned: bool,
    ban_until: i64,
}

struct Inner {
    limits: RateLimiterLimits,
    peers: HashMap<IpAddr, PeerRequestInfo>,
    active_transfers: u32,
    total_bytes_served: u64,
    last_reset_time: i64,
}

pub struct RateLimiter {
    inner: Mutex<Inner>,
}

impl RateLimiter {
    pub fn new(limits: RateLimiterLimits, now: i64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                limits,
                peers: HashMap::new(),
                active_transfers: 0,
                total_bytes_served: 0,
                last_reset_time: now,
            }),
        }
    }

    /// Admit or deny a chunk request from `addr`.
    ///
    /// On admission the active-transfer count is incremented; the caller
    /// must invoke [`complete_transfer`] exactly once afterwards, whether
    /// serving succeeded or failed.
    ///
    /// [`complete_transfer`]: RateLimiter::complete_transfer
    pub fn allow_request(&self, addr: IpAddr, chunk: u32, now: i64) -> Result<(), DenyReason> {
        let mut inner = self.inner.lock();
        let Inner { limits, peers, active_transfers, .. } = &mut *inner;
        let info = peers.entry(addr).or_default();

        if info.banned {
            if now < info.ban_until {
                return Err(DenyReason::Banned { until: info.ban_until });
            }
            info.banned = false;
            info.ban_until = 0;
            info.request_times.clear();
        }

        if *active_transfers >= limits.max_concurrent_transfers {
            return Err(DenyReason::AtCapacity {
                max_concurrent: limits.max_concurrent_transfers,
            });
        }

        if info.last_request_time > 0 {
            let since_last = now - info.last_request_time;
            if since_last < limits.min_seconds_between_requests {
                return Err(DenyReason::TooFast {
                    wait_s: limits.min_seconds_between_requests - since_last,
                });
            }
        }

        if let Some(&served_at) = info.served_chunks.get(&chunk) {
            let since_served = now - served_at;
            if since_served < limits.duplicate_chunk_window_s {
                return Err(DenyReason::DuplicateChunk { chunk, served_ago_s: since_served });
            }
        }

        while let Some(&front) = info.request_times.front() {
            if now - front > REQUEST_WINDOW_S {
                info.request_times.pop_front();
            } else {
                break;
            }
        }

        if info.request_times.len() as u32 >= limits.max_chunks_per_peer_per_minute {
            if info.request_times.len() as u32 >= limits.ban_threshold {
                info.banned = true;
                info.ban_until = now + limits.ban_duration_s;
                warn!(
                    peer = %addr,
                    ban_s = limits.ban_duration_s,
                    "banning peer for excessive snapshot requests"
                );
            }
            return Err(DenyReason::RateLimited {
                max_per_minute: limits.max_chunks_per_peer_per_minute,
            });
        }

        info.request_times.push_back(now);
        info.last_request_time = now;
        info.total_requests += 1;
        *active_transfers += 1;
        Ok(())
    }

    /// Record a chunk actually served, for duplicate suppression and
    /// bandwidth accounting.
    pub fn record_served(&self, addr: IpAddr, chunk: u32, bytes: u64, now: i64) {
        let mut inner = self.inner.lock();
        inner.peers.entry(addr).or_default().served_chunks.insert(chunk, now);
        inner.total_bytes_served += bytes;
        debug!(peer = %addr, chunk, bytes, "served chunk");
    }

    /// Release one admission slot. Never drops below zero.
    pub fn complete_transfer(&self) {
        let mut inner = self.inner.lock();
        inner.active_transfers = inner.active_transfers.saturating_sub(1);
    }

    pub fn is_banned(&self, addr: IpAddr, now: i64) -> bool {
        let inner = self.inner.lock();
        match inner.peers.get(&addr) {
            Some(info) => info.banned && now < info.ban_until,
            None => false,
        }
    }

    /// Periodic housekeeping: evict peers idle past 10 minutes (unless
    /// banned) and log/reset the hourly bandwidth counter.
    pub fn cleanup(&self, now: i64) {
        let mut inner = self.inner.lock();
        inner
            .peers
            .retain(|_, info| info.banned || now - info.last_request_time <= PEER_IDLE_EVICT_S);

        if now - inner.last_reset_time > BYTES_LOG_INTERVAL_S {
            info!(
                mb_served = inner.total_bytes_served / (1024 * 1024),
                "snapshot bandwidth served this hour"
            );
            inner.total_bytes_served = 0;
            inner.last_reset_time = now;
        }
    }

    /// Override the three operator-tunable limits at runtime.
    pub fn set_limits(&self, max_chunks_per_minute: u32, max_concurrent: u32, min_sec_between: i64) {
        let mut inner = self.inner.lock();
        inner.limits.max_chunks_per_peer_per_minute = max_chunks_per_minute;
        inner.limits.max_concurrent_transfers = max_concurrent;
        inner.limits.min_seconds_between_requests = min_sec_between;
        info!(
            max_chunks_per_minute,
            max_concurrent, min_sec_between, "snapshot rate limits updated"
        );
    }

    pub fn active_transfers(&self) -> u32 {
        self.inner.lock().active_transfers
    }

    pub fn total_bytes_served(&self) -> u64 {
        self.inner.lock().total_bytes_served
    }
}
