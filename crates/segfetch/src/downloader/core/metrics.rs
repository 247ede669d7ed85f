//! Counters for segment activity across sessions
//!
//! All fields are atomics so concurrent segment workers can update them
//! without coordination.

use std::sync::atomic::{AtomicU64, Ordering};

/// Segment statistics accumulated by a [`Downloader`](crate::Downloader)
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    pub sessions_started: AtomicU64,
    pub sessions_completed: AtomicU64,
    pub segments_started: AtomicU64,
    pub segments_completed: AtomicU64,
    pub segments_failed: AtomicU64,
    pub retries_attempted: AtomicU64,
    pub bytes_transferred: AtomicU64,
    pub bytes_rolled_back: AtomicU64,
}

impl DownloadMetrics {
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_started(&self) {
        self.segments_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a segment that finished with `size` bytes on disk
    pub fn record_segment_completed(&self, size: u64) {
        self.segments_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_segment_failed(&self) {
        self.segments_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry and the bytes discarded from the aborted attempt
    pub fn record_retry(&self, rolled_back: u64) {
        self.retries_attempted.fetch_add(1, Ordering::Relaxed);
        self.bytes_rolled_back.fetch_add(rolled_back, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> DownloadMetricsSnapshot {
        DownloadMetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            segments_started: self.segments_started.load(Ordering::Relaxed),
            segments_completed: self.segments_completed.load(Ordering::Relaxed),
            segments_failed: self.segments_failed.load(Ordering::Relaxed),
            retries_attempted: self.retries_attempted.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            bytes_rolled_back: self.bytes_rolled_back.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of download metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadMetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub segments_started: u64,
    pub segments_completed: u64,
    pub segments_failed: u64,
    pub retries_attempted: u64,
    pub bytes_transferred: u64,
    pub bytes_rolled_back: u64,
}

impl DownloadMetricsSnapshot {
    /// Fraction of started sessions that produced an output file
    pub fn success_rate(&self) -> f64 {
        if self.sessions_started == 0 {
            0.0
        } else {
            self.sessions_completed as f64 / self.sessions_started as f64
        }
    }
}
