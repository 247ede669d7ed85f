//! Error types for the segmented downloader with context and recovery information

use std::path::PathBuf;
use thiserror::Error;

use super::cancel::CancelCause;

/// Every failure a download session can surface
#[derive(Error, Debug)]
pub enum DownloadError {
    /// URL parsing errors with helpful suggestions
    #[error("Invalid URL '{url}': {suggestion}")]
    InvalidUrl {
        url: String,
        suggestion: String,
        #[source]
        source: Option<url::ParseError>,
    },

    /// Scheme not handled by the concurrent path
    #[error("Unsupported URL scheme in '{url}' (supported: {supported_schemes})")]
    UnsupportedUrl {
        url: String,
        scheme: String,
        supported_schemes: String,
    },

    /// Configuration errors, rejected before any network activity
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
        suggestion: Option<String>,
    },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },

    /// Transport-level HTTP failure
    #[error("HTTP request to '{url}' failed")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Metadata probe answered with something other than 200 OK
    #[error("Server unreachable or returned error status {status} for '{url}'")]
    ServerUnreachable { url: String, status: u16 },

    /// Metadata probe reported no usable total size
    #[error("Content length is invalid or missing for '{url}'")]
    InvalidContentLength { url: String },

    /// A segment request came back with the wrong status
    #[error("Unexpected status {actual} for segment {index} (expected {expected})")]
    UnexpectedStatus {
        index: usize,
        expected: u16,
        actual: u16,
    },

    /// A segment body did not match its planned byte range
    #[error("Segment {index} received {actual} bytes, expected {expected}")]
    SegmentLengthMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    /// File system I/O errors with file context
    #[error("File operation failed on '{path}' while {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// Session cancelled cooperatively
    #[error("Download cancelled: {cause}")]
    Cancelled { cause: CancelCause },

    /// A segment reached terminal failure after exhausting its attempts
    #[error("Segment {index} failed after {attempts} attempts")]
    SegmentFailed {
        index: usize,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {reason}")]
    WorkerTask { reason: String },

    /// Content sniffing did not recognise the leading bytes
    #[error("Unable to detect file type of '{path}'")]
    UnknownFileType { path: PathBuf },

    /// Reassembly failed on a specific segment
    #[error("Failed to merge segment {index} into '{output}'")]
    Merge {
        index: usize,
        output: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Check if a segment attempt that produced this error may be retried
    ///
    /// Every per-attempt failure is transient except cancellation. Errors that
    /// already describe a terminal outcome are never retried again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DownloadError::Cancelled { .. }
                | DownloadError::SegmentFailed { .. }
                | DownloadError::WorkerTask { .. }
        )
    }

    /// True when this error, or the error it wraps, is a cancellation
    pub fn is_cancellation(&self) -> bool {
        match self {
            DownloadError::Cancelled { .. } => true,
            DownloadError::SegmentFailed { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::InvalidUrl { .. } => "invalid_url",
            DownloadError::UnsupportedUrl { .. } => "unsupported_url",
            DownloadError::Configuration { .. } => "configuration",
            DownloadError::ClientBuild { .. } => "client_build",
            DownloadError::HttpRequest { .. } => "http_request",
            DownloadError::ServerUnreachable { .. } => "server_unreachable",
            DownloadError::InvalidContentLength { .. } => "invalid_content_length",
            DownloadError::UnexpectedStatus { .. } => "unexpected_status",
            DownloadError::SegmentLengthMismatch { .. } => "segment_length_mismatch",
            DownloadError::FileSystem { .. } => "file_system",
            DownloadError::Cancelled { .. } => "cancelled",
            DownloadError::SegmentFailed { .. } => "segment_failed",
            DownloadError::WorkerTask { .. } => "worker_task",
            DownloadError::UnknownFileType { .. } => "unknown_file_type",
            DownloadError::Merge { .. } => "merge",
        }
    }

    pub(crate) fn fs(
        path: impl Into<PathBuf>,
        operation: FileOperation,
        source: std::io::Error,
    ) -> Self {
        DownloadError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }

    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        DownloadError::HttpRequest {
            url: url.to_string(),
            source,
        }
    }
}

impl From<url::ParseError> for DownloadError {
    fn from(error: url::ParseError) -> Self {
        let suggestion = match error {
            url::ParseError::EmptyHost => "URL must have a valid hostname",
            url::ParseError::InvalidPort => "Port number must be between 1 and 65535",
            url::ParseError::InvalidIpv4Address => "Invalid IPv4 address format",
            url::ParseError::InvalidIpv6Address => "Invalid IPv6 address format",
            url::ParseError::RelativeUrlWithoutBase => {
                "URL must be absolute (include http:// or https://)"
            }
            _ => "Check URL format and try again",
        }
        .to_string();

        DownloadError::InvalidUrl {
            url: "<unparseable>".to_string(),
            suggestion,
            source: Some(error),
        }
    }
}
