//! Per-snapshot download progress tracking.
//!
//! Single-writer: only the download coordinator path mutates this state.
//! Created when a snapshot download begins, destroyed after extraction.

use crate::manifest::SNAPSHOT_CHUNK_SIZE;
use std::collections::HashMap;
use tracing::info;

/// A chunk request is considered recent for this long.
pub const RECENT_REQUEST_WINDOW_S: i64 = 60;

const PROGRESS_EVERY_CHUNKS: u32 = 10;
const PROGRESS_EVERY_SECS: i64 = 30;

pub struct DownloadState {
    total_chunks: u32,
    received: Vec<u64>,
    received_count: u32,
    /// Lowest index that might still be unreceived; maintained so
    /// `next_chunk_to_request` stays O(1) amortized.
    next_hint: u32,
    request_times: HashMap<u32, i64>,
    download_start: i64,
    last_progress_time: i64,
    last_progress_count: u32,
}

impl DownloadState {
    pub fn new(total_chunks: u32) -> Self {
        let words = (total_chunks as usize).div_ceil(64);
        Self {
            total_chunks,
            received: vec![0u64; words],
            received_count: 0,
            next_hint: 0,
            request_times: HashMap::new(),
            download_start: 0,
            last_progress_time: 0,
            last_progress_count: 0,
        }
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn is_chunk_received(&self, chunk: u32) -> bool {
        if chunk >= self.total_chunks {
            return false;
        }
        self.received[(chunk / 64) as usize] & (1u64 << (chunk % 64)) != 0
    }

    /// Mark a chunk received. Out-of-range indices are ignored; re-marking a
    /// chunk is a no-op. Emits a progress log every 10 chunks or 30 seconds,
    /// and a completion log when the last distinct chunk lands.
    pub fn mark_chunk_received(&mut self, chunk: u32, now: i64) {
        if chunk >= self.total_chunks || self.is_chunk_received(chunk) {
            return;
        }
        self.received[(chunk / 64) as usize] |= 1u64 << (chunk % 64);
        self.received_count += 1;
        while self.next_hint < self.total_chunks && self.is_chunk_received(self.next_hint) {
            self.next_hint += 1;
        }

        if self.download_start == 0 {
            self.download_start = now;
            self.last_progress_time = now;
            info!(
                chunks = self.total_chunks,
                gb = %format!("{:.2}", approx_total_gb(self.total_chunks)),
                "snapshot download starting"
            );
        }

        let should_log = self.received_count % PROGRESS_EVERY_CHUNKS == 0
            || now - self.last_progress_time >= PROGRESS_EVERY_SECS;
        if should_log && self.received_count > self.last_progress_count {
            self.log_progress(now);
            self.last_progress_time = now;
            self.last_progress_count = self.received_count;
        }

        if self.is_complete() {
            info!(
                chunks = self.total_chunks,
                elapsed_s = now - self.download_start,
                "snapshot download complete; extracting next"
            );
        }
    }

    fn log_progress(&self, now: i64) {
        if self.received_count == 0 || self.total_chunks == 0 {
            return;
        }
        let percent = (self.received_count as f64 * 100.0) / self.total_chunks as f64;
        let elapsed = now - self.download_start;
        let eta = if elapsed > 0 {
            let rate = self.received_count as f64 / elapsed as f64;
            let remaining = self.total_chunks - self.received_count;
            format_eta((remaining as f64 / rate) as i64)
        } else {
            "calculating...".into()
        };
        info!(
            received = self.received_count,
            total = self.total_chunks,
            percent = %format!("{percent:.1}"),
            eta = %eta,
            "snapshot download progress"
        );
    }

    /// Monotone: once true, stays true for the lifetime of this state.
    pub fn is_complete(&self) -> bool {
        self.received_count == self.total_chunks
    }

    /// Lowest unreceived chunk index, or `total_chunks` when complete.
    pub fn next_chunk_to_request(&self) -> u32 {
        let mut i = self.next_hint;
        while i < self.total_chunks && self.is_chunk_received(i) {
            i += 1;
        }
        i
    }

    pub fn record_chunk_request(&mut self, chunk: u32, t: i64) {
        self.request_times.insert(chunk, t);
    }

    pub fn has_recent_request(&self, chunk: u32, now: i64) -> bool {
        match self.request_times.get(&chunk) {
            Some(&t) => now - t < RECENT_REQUEST_WINDOW_S,
            None => false,
        }
    }
}

fn approx_total_gb(chunks: u32) -> f64 {
    (chunks as u64 * SNAPSHOT_CHUNK_SIZE) as f64 / (1024.0 * 1024.0 * 1024.0)
}

fn format_eta(secs: i64) -> String {
    if secs < 60 {
        format!("{secs} seconds")
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} hours {} minutes", secs / 3600, (secs % 3600) / 60)
    }
}
