//! Segfetch Library
//!
//! Concurrent segmented HTTP downloads. A resource is probed for its size
//! and byte-range support, split into contiguous segments fetched in
//! parallel with per-segment retry, then reassembled into a single file
//! whose extension is sniffed from its content.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use segfetch::{DownloadConfig, DownloadRequest, Downloader, ProgressEvent};
//! use std::sync::Arc;
//!
//! # async fn example() -> segfetch::Result<()> {
//! let config = DownloadConfig::default()
//!     .with_segments(8)
//!     .with_output_dir("/tmp/downloads");
//!
//! let downloader = Downloader::new(config)?
//!     .with_progress_callback(Arc::new(|event: ProgressEvent| {
//!         if let ProgressEvent::RetryScheduled { index, attempt, .. } = event {
//!             println!("segment {} retrying (attempt {})", index, attempt + 1);
//!         }
//!     }));
//!
//! let request = DownloadRequest::new("https://example.com/files/archive.tar.gz");
//! let path = downloader.download(request).await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Range probing**: falls back to a single full-body request when ranges are unsupported
//! - **Per-segment retry**: exponential backoff, bounded attempts, progress rollback
//! - **Cooperative cancellation**: the first terminal failure or an interrupt stops every worker
//! - **Content sniffing**: the output extension comes from the leading bytes, not headers
//! - **Proxy support**: HTTP, HTTPS and SOCKS5 with credentials
//! - **Guaranteed cleanup**: temporary segments are removed on every exit path

pub mod downloader;

// Re-export commonly used types for convenience
pub use downloader::{
    CancelCause, DownloadConfig, DownloadError, DownloadMetricsSnapshot, DownloadRequest,
    Downloader, IntoProgressCallback, ProgressCallback, ProgressEvent, ProgressReporter, Result,
    TracingProgressReporter,
};
