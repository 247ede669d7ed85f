//! Core types used throughout the downloader system
//!
//! This module contains the fundamental types that all other modules depend on.
//! By organizing these in a core module, we make the dependency relationships clear.

pub mod cancel;
pub mod error;
pub mod files;
pub mod http;
pub mod metrics;
pub mod progress;
pub mod sniff;

// Re-export main types for convenience
pub use cancel::{CancelCause, CancelSignal};
pub use error::{DownloadError, FileOperation, Result};
pub use metrics::{DownloadMetrics, DownloadMetricsSnapshot};
pub use progress::{
    IntoProgressCallback, NullProgressReporter, ProgressCallback, ProgressEvent, ProgressReporter,
    ProgressTracker, SegmentProgress, TracingProgressReporter,
};

use std::borrow::Cow;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Schemes the concurrent path accepts
pub const SUPPORTED_SCHEMES: &[&str] = &["http", "https"];

/// Stem used when nothing usable can be derived from the URL
pub const FALLBACK_STEM: &str = "download";

/// Outcome of the capability probe
///
/// Produced once per session and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total resource size in bytes, always greater than zero
    pub total_size: u64,
    /// Whether the origin honoured a `bytes=0-0` range request
    pub supports_range: bool,
}

/// A contiguous byte range of the resource with its own temporary store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Position in the final byte stream (0-based)
    pub index: usize,
    /// First byte offset
    pub start: u64,
    /// Last byte offset (inclusive)
    pub end: u64,
    /// Segment-local temporary file
    pub temp_path: PathBuf,
}

impl Segment {
    /// Number of bytes this segment covers
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Value of the `Range` request header for this segment
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Terminal report of one segment worker
#[derive(Debug)]
pub struct SegmentResult {
    pub segment: Segment,
    pub outcome: Result<u64>,
}

impl SegmentResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A request to download one URL
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Target resource
    pub url: String,
    /// Output filename stem; the sniffed extension is appended
    pub output_name: Option<String>,
    /// Caller-owned token translated into a session interrupt
    pub interrupt: Option<CancellationToken>,
}

impl DownloadRequest {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            output_name: None,
            interrupt: None,
        }
    }

    /// Override the output stem (otherwise derived from the URL path)
    pub fn with_output_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// Attach an external interrupt (e.g. wired to Ctrl-C)
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// Parse and check the URL without touching the network
    pub fn parsed_url(&self) -> Result<Url> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(DownloadError::InvalidUrl {
                url: String::new(),
                suggestion: "URL cannot be empty".to_string(),
                source: None,
            });
        }

        let url = Url::parse(raw).map_err(|e| match DownloadError::from(e) {
            DownloadError::InvalidUrl { suggestion, source, .. } => DownloadError::InvalidUrl {
                url: raw.to_string(),
                suggestion,
                source,
            },
            other => other,
        })?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(DownloadError::UnsupportedUrl {
                url: raw.to_string(),
                scheme: url.scheme().to_string(),
                supported_schemes: SUPPORTED_SCHEMES.join(", "),
            });
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(DownloadError::InvalidUrl {
                url: raw.to_string(),
                suggestion: "URL is missing host".to_string(),
                source: None,
            });
        }

        Ok(url)
    }

    /// Output stem: explicit name if set, otherwise the last URL path
    /// component with every extension stripped
    pub fn output_stem(&self, url: &Url) -> String {
        if let Some(name) = self.output_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
        stem_from_path(url.path())
    }
}

/// Last path component, percent-decoded, with all extensions removed
/// (`a.tar.gz` -> `a`, `my%20file.pdf` -> `my file`)
pub fn stem_from_path(path: &str) -> String {
    let raw = path.rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
    // a decoded separator must not reach the output path
    let last = decoded.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match last.find('.') {
        // a leading dot is a hidden-file marker, not an extension
        Some(0) => last.trim_start_matches('.').split('.').next().unwrap_or_default(),
        Some(pos) => &last[..pos],
        None => last,
    };
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}
