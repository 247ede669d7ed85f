//! Session orchestration
//!
//! A session owns one download from probe to merged output:
//! probe, plan, fan out one worker per segment, collect their terminal
//! results in arrival order, then sniff and merge. Temporary segment files
//! are removed and the progress display is closed on every exit path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, info_span, warn};
use url::Url;

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::files::{SegmentNaming, SegmentSet, merge_segments};
use crate::downloader::core::http::probe;
use crate::downloader::core::sniff::detect_extension;
use crate::downloader::core::{
    CancelCause, CancelSignal, DownloadError, DownloadMetrics, FileOperation, ProbeResult,
    ProgressCallback, ProgressEvent, ProgressTracker, Result,
};
use crate::downloader::planner::plan_segments;
use crate::downloader::worker::{SegmentContext, run_segment};

/// One download from a validated URL to a merged output file
pub struct DownloadSession {
    client: Client,
    config: DownloadConfig,
    metrics: Arc<DownloadMetrics>,
    callback: Option<ProgressCallback>,
    url: Url,
    naming: SegmentNaming,
    signal: CancelSignal,
}

// Stops the interrupt forwarder once the session is over
struct InterruptLink(JoinHandle<()>);

impl Drop for InterruptLink {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl DownloadSession {
    pub fn new(
        client: Client,
        config: DownloadConfig,
        metrics: Arc<DownloadMetrics>,
        callback: Option<ProgressCallback>,
        url: Url,
        naming: SegmentNaming,
    ) -> Self {
        Self {
            client,
            config,
            metrics,
            callback,
            url,
            naming,
            signal: CancelSignal::new(),
        }
    }

    /// The session's cancellation signal
    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Run to completion, returning the path of the merged output
    pub async fn run(self, interrupt: Option<CancellationToken>) -> Result<PathBuf> {
        let span = info_span!("download", url = %self.url, stem = self.naming.stem());
        self.execute(interrupt).instrument(span).await
    }

    async fn execute(self, interrupt: Option<CancellationToken>) -> Result<PathBuf> {
        let _link = interrupt.map(|token| {
            if token.is_cancelled() {
                self.signal.cancel(CancelCause::Interrupted);
            }
            InterruptLink(self.signal.link_interrupt(token))
        });
        if self.signal.is_cancelled() {
            return Err(self.signal.error());
        }

        self.metrics.record_session_started();
        let url = self.url.as_str().to_string();

        // Covers the HEAD and the range probe
        let probe = tokio::select! {
            biased;
            _ = self.signal.cancelled() => return Err(self.signal.error()),
            probed = probe(&self.client, &url) => probed?,
        };
        if !probe.supports_range {
            info!("Server does not honour byte ranges, using a single segment");
        }

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| DownloadError::fs(&self.config.output_dir, FileOperation::Create, e))?;

        let segments = SegmentSet::new(plan_segments(&probe, self.config.segments, &self.naming)?);
        let tracker = Arc::new(ProgressTracker::new(
            probe.total_size,
            self.config.show_progress,
            self.callback.clone(),
        ));
        tracker.emit(ProgressEvent::SessionStarted {
            url: url.clone(),
            total_size: probe.total_size,
            segments: segments.len(),
            ranged: probe.supports_range,
        });

        let outcome = self.transfer(&url, probe, &segments, &tracker).await;
        tracker.close();
        if let Some(cause) = self.signal.cause() {
            tracker.emit(ProgressEvent::SessionCancelled { cause });
        }
        outcome?;

        let output = self.assemble(&segments, &tracker).await;
        segments.cleanup().await;
        output
    }

    /// Fan out one worker per segment and wait for all of them
    ///
    /// Returns the first terminal error by arrival order. That error also
    /// cancels every other worker.
    async fn transfer(
        &self,
        url: &str,
        probe: ProbeResult,
        segments: &SegmentSet,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<()> {
        let ctx = Arc::new(SegmentContext {
            client: self.client.clone(),
            url: url.to_string(),
            supports_range: probe.supports_range,
            config: self.config.clone(),
            tracker: Arc::clone(tracker),
            signal: self.signal.clone(),
            metrics: Arc::clone(&self.metrics),
        });

        let mut workers = JoinSet::new();
        let mut task_segments = HashMap::new();
        for segment in segments.iter().cloned() {
            let index = segment.index;
            let span = debug_span!("segment", index);
            let handle = workers.spawn(run_segment(Arc::clone(&ctx), segment).instrument(span));
            task_segments.insert(handle.id(), index);
        }
        drop(ctx);

        let mut first_error: Option<DownloadError> = None;

        while let Some(joined) = workers.join_next().await {
            let (index, error) = match joined {
                Ok(result) => match result.outcome {
                    Ok(_) => continue,
                    Err(e) => (result.segment.index, e),
                },
                Err(join_error) => {
                    let index = task_segments.get(&join_error.id()).copied().unwrap_or_default();
                    (
                        index,
                        DownloadError::WorkerTask {
                            reason: join_error.to_string(),
                        },
                    )
                }
            };

            if error.is_cancellation() {
                debug!(segment = index, "Segment stopped by cancellation");
            } else {
                warn!(segment = index, category = error.category(), "Segment failed: {}", error);
                tracker.emit(ProgressEvent::SegmentFailed {
                    index,
                    error: error.to_string(),
                });
                // Workers raise this themselves on exhaustion; kept for panics
                self.signal.cancel(CancelCause::SegmentFailed { index });
                if no_failure_recorded(&first_error) {
                    info!("Cancelling remaining segments after segment {} failed", index);
                }
            }

            // A sibling's cancellation can arrive before the failure that caused it
            let replace = match &first_error {
                None => true,
                Some(current) => {
                    current.is_cancellation()
                        && !error.is_cancellation()
                        && self.signal.cause() != Some(CancelCause::Interrupted)
                }
            };
            if replace {
                first_error = Some(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Sniff the type from the first segment and merge into the final file
    async fn assemble(&self, segments: &SegmentSet, tracker: &ProgressTracker) -> Result<PathBuf> {
        let first = segments.first().ok_or_else(|| DownloadError::WorkerTask {
            reason: "session finished without segments".to_string(),
        })?;
        let extension = detect_extension(&first.temp_path).await?;
        let output = self.naming.output_path(extension);

        let size = merge_segments(segments, &output).await?;
        info!(path = %output.display(), size, "Download complete");

        self.metrics.record_session_completed();
        tracker.emit(ProgressEvent::SessionCompleted {
            path: output.clone(),
            size,
            transferred: tracker.transferred(),
        });
        Ok(output)
    }
}

fn no_failure_recorded(first_error: &Option<DownloadError>) -> bool {
    first_error.as_ref().is_none_or(DownloadError::is_cancellation)
}

impl std::fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("url", &self.url.as_str())
            .field("naming", &self.naming)
            .field("cancelled", &self.signal.is_cancelled())
            .finish()
    }
}
