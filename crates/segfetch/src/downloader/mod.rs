//! Downloader module
//!
//! This module contains all the download functionality including
//! core types, configuration, planning, segment workers and sessions.

pub mod core;
pub mod config;
pub mod planner;
pub mod worker;
pub mod session;
pub mod r#lib;

// Re-export main types for convenience
pub use r#lib::Downloader;
pub use core::{
    CancelCause, CancelSignal, DownloadError, DownloadMetrics, DownloadMetricsSnapshot,
    DownloadRequest, FileOperation, IntoProgressCallback, NullProgressReporter, ProbeResult,
    ProgressCallback, ProgressEvent, ProgressReporter, ProgressTracker, Result, Segment,
    SegmentResult, TracingProgressReporter,
};
pub use config::{DownloadConfig, MAX_SEGMENTS, MIN_SEGMENTS};
pub use planner::{effective_segment_count, plan_segments};
pub use session::DownloadSession;
