//! Progress tracking and reporting for segmented downloads
//!
//! [`ProgressTracker`] is the only state written concurrently by segment
//! workers. Its byte counter is a single atomic cell; the terminal bar and the
//! event callback are display only and never feed back into control flow.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use super::cancel::CancelCause;

/// Progress callback for download sessions
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted during a download session
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    SessionStarted {
        url: String,
        total_size: u64,
        segments: usize,
        ranged: bool,
    },
    SegmentStarted {
        index: usize,
        attempt: u32,
    },
    BytesTransferred {
        transferred: u64,
        total: u64,
    },
    RetryScheduled {
        index: usize,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    ProgressRolledBack {
        index: usize,
        bytes: u64,
    },
    SegmentCompleted {
        index: usize,
        bytes: u64,
    },
    SegmentFailed {
        index: usize,
        error: String,
    },
    SessionCancelled {
        cause: CancelCause,
    },
    /// `transferred` is the tracker's final count, which equals `size` once
    /// every rolled-back attempt has been taken out again
    SessionCompleted {
        path: PathBuf,
        size: u64,
        transferred: u64,
    },
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_session_started(&self, _url: &str, _total_size: u64, _segments: usize, _ranged: bool) {}
    fn on_segment_started(&self, _index: usize, _attempt: u32) {}
    fn on_bytes_transferred(&self, _transferred: u64, _total: u64) {}
    fn on_retry_scheduled(
        &self,
        _index: usize,
        _attempt: u32,
        _max_attempts: u32,
        _delay: Duration,
    ) {
    }
    fn on_progress_rolled_back(&self, _index: usize, _bytes: u64) {}
    fn on_segment_completed(&self, _index: usize, _bytes: u64) {}
    fn on_segment_failed(&self, _index: usize, _error: &str) {}
    fn on_session_cancelled(&self, _cause: CancelCause) {}
    fn on_session_completed(&self, _path: &std::path::Path, _size: u64, _transferred: u64) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::SessionStarted { url, total_size, segments, ranged } => {
                self.on_session_started(&url, total_size, segments, ranged);
            }
            ProgressEvent::SegmentStarted { index, attempt } => {
                self.on_segment_started(index, attempt);
            }
            ProgressEvent::BytesTransferred { transferred, total } => {
                self.on_bytes_transferred(transferred, total);
            }
            ProgressEvent::RetryScheduled { index, attempt, max_attempts, delay } => {
                self.on_retry_scheduled(index, attempt, max_attempts, delay);
            }
            ProgressEvent::ProgressRolledBack { index, bytes } => {
                self.on_progress_rolled_back(index, bytes);
            }
            ProgressEvent::SegmentCompleted { index, bytes } => {
                self.on_segment_completed(index, bytes);
            }
            ProgressEvent::SegmentFailed { index, error } => {
                self.on_segment_failed(index, &error);
            }
            ProgressEvent::SessionCancelled { cause } => {
                self.on_session_cancelled(cause);
            }
            ProgressEvent::SessionCompleted { path, size, transferred } => {
                self.on_session_completed(&path, size, transferred);
            }
        })
    }
}

/// Reporter that turns session events into `tracing` records
#[derive(Debug, Default)]
pub struct TracingProgressReporter;

impl ProgressReporter for TracingProgressReporter {
    fn on_session_started(&self, url: &str, total_size: u64, segments: usize, ranged: bool) {
        info!(%url, total_size, segments, ranged, "download started");
    }

    fn on_segment_started(&self, index: usize, attempt: u32) {
        debug!(segment = index, attempt, "segment attempt started");
    }

    fn on_retry_scheduled(&self, index: usize, attempt: u32, max_attempts: u32, delay: Duration) {
        warn!(
            segment = index,
            "retrying segment (attempt {}/{}) in {:?}",
            attempt + 1,
            max_attempts,
            delay
        );
    }

    fn on_progress_rolled_back(&self, index: usize, bytes: u64) {
        debug!(segment = index, bytes, "rolled back partial progress");
    }

    fn on_segment_completed(&self, index: usize, bytes: u64) {
        debug!(segment = index, bytes, "segment completed");
    }

    fn on_segment_failed(&self, index: usize, error: &str) {
        warn!(segment = index, "segment failed: {}", error);
    }

    fn on_session_cancelled(&self, cause: CancelCause) {
        warn!("download cancelled: {}", cause);
    }

    fn on_session_completed(&self, path: &std::path::Path, size: u64, transferred: u64) {
        if transferred != size {
            warn!(size, transferred, "progress total disagrees with merged size");
        }
        info!(path = %path.display(), size, "download complete");
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}

const BAR_TEMPLATE: &str =
    "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

static BAR_STYLE: Lazy<Option<ProgressStyle>> = Lazy::new(|| {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .ok()
        .map(|style| style.progress_chars("=> "))
});

/// Minimum interval between `BytesTransferred` events
const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Shared byte counter and renderer for one session
pub struct ProgressTracker {
    transferred: AtomicU64,
    total: u64,
    bar: ProgressBar,
    callback: Option<ProgressCallback>,
    started: Instant,
    last_report_ms: AtomicU64,
    closed: AtomicBool,
}

impl ProgressTracker {
    /// Create a tracker bound to `total` bytes
    ///
    /// The terminal bar is drawn only when `show_bar` is set.
    pub fn new(total: u64, show_bar: bool, callback: Option<ProgressCallback>) -> Self {
        let bar = if show_bar {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        if let Some(style) = BAR_STYLE.as_ref() {
            bar.set_style(style.clone());
        }
        bar.set_message("Downloading");

        Self {
            transferred: AtomicU64::new(0),
            total,
            bar,
            callback,
            started: Instant::now(),
            last_report_ms: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes counted so far
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Count `bytes` received by some worker
    pub fn add(&self, bytes: u64) {
        let now = self.transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.bar.set_position(now);
        self.maybe_report(now);
    }

    /// Un-count `bytes` that belonged to an aborted attempt
    pub fn subtract(&self, bytes: u64) {
        let previous = self
            .transferred
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            })
            .unwrap_or_else(|current| current);
        self.bar.set_position(previous.saturating_sub(bytes));
    }

    /// Forward an event to the injected callback, if any
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }

    fn maybe_report(&self, transferred: u64) {
        if self.callback.is_none() {
            return;
        }
        let elapsed = self.started.elapsed().as_millis() as u64;
        let last = self.last_report_ms.load(Ordering::Relaxed);
        let due = elapsed.saturating_sub(last) >= REPORT_INTERVAL.as_millis() as u64
            || transferred == self.total;
        if due
            && self
                .last_report_ms
                .compare_exchange(last, elapsed, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.emit(ProgressEvent::BytesTransferred {
                transferred,
                total: self.total,
            });
        }
    }

    /// Tear down the display. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let transferred = self.transferred();
        self.bar.set_position(transferred);
        if transferred >= self.total {
            self.bar.finish_with_message("Downloaded");
        } else {
            self.bar.abandon_with_message("Stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("transferred", &self.transferred())
            .field("total", &self.total)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Per-attempt view of the tracker owned by one segment worker
///
/// Remembers how much the current attempt has counted so a failed attempt
/// can take exactly that amount back out of the shared total.
#[derive(Debug)]
pub struct SegmentProgress {
    tracker: Arc<ProgressTracker>,
    index: usize,
    counted: u64,
}

impl SegmentProgress {
    pub fn new(tracker: Arc<ProgressTracker>, index: usize) -> Self {
        Self {
            tracker,
            index,
            counted: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.counted += bytes;
        self.tracker.add(bytes);
    }

    /// Bytes counted by the current attempt
    pub fn counted(&self) -> u64 {
        self.counted
    }

    /// Remove this attempt's bytes from the shared total and start over
    pub fn rollback(&mut self) -> u64 {
        let bytes = std::mem::take(&mut self.counted);
        if bytes > 0 {
            self.tracker.subtract(bytes);
            self.tracker.emit(ProgressEvent::ProgressRolledBack {
                index: self.index,
                bytes,
            });
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn concurrent_adds_are_all_counted() {
        let tracker = Arc::new(ProgressTracker::new(8_000, false, None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        tracker.add(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.transferred(), 8_000);
    }

    #[test]
    fn rollback_removes_only_the_attempts_bytes() {
        let tracker = Arc::new(ProgressTracker::new(100, false, None));
        let mut first = SegmentProgress::new(Arc::clone(&tracker), 0);
        let mut second = SegmentProgress::new(Arc::clone(&tracker), 1);

        first.record(30);
        second.record(20);
        second.record(5);
        assert_eq!(tracker.transferred(), 55);

        assert_eq!(second.rollback(), 25);
        assert_eq!(second.counted(), 0);
        assert_eq!(tracker.transferred(), 30);

        // nothing left to take back
        assert_eq!(second.rollback(), 0);
        assert_eq!(tracker.transferred(), 30);
    }

    #[test]
    fn rollback_emits_event() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Arc::new(move |event| sink.lock().unwrap().push(event));

        let tracker = Arc::new(ProgressTracker::new(10, false, Some(callback)));
        let mut progress = SegmentProgress::new(tracker, 3);
        progress.record(4);
        progress.rollback();

        let events = events.lock().unwrap();
        assert!(events.iter().any(|event| matches!(
            event,
            ProgressEvent::ProgressRolledBack { index: 3, bytes: 4 }
        )));
    }

    #[test]
    fn close_is_idempotent() {
        let tracker = ProgressTracker::new(10, false, None);
        tracker.add(10);
        tracker.close();
        tracker.close();
        assert!(tracker.is_closed());
        assert_eq!(tracker.transferred(), 10);
    }
}
