//! Segment worker with bounded retry
//!
//! One worker runs per segment. It streams its byte range into the segment's
//! temporary file and retries transient failures with exponential backoff.
//! Every suspension point (request, body chunk, backoff) observes the
//! session's cancellation signal.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, StatusCode, header};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{
    CancelCause, CancelSignal, DownloadError, DownloadMetrics, FileOperation, ProgressEvent,
    ProgressTracker, Result, Segment, SegmentProgress, SegmentResult,
};

/// Read-only state shared by all workers of a session
#[derive(Debug)]
pub struct SegmentContext {
    pub client: Client,
    pub url: String,
    pub supports_range: bool,
    pub config: DownloadConfig,
    pub tracker: Arc<ProgressTracker>,
    pub signal: CancelSignal,
    pub metrics: Arc<DownloadMetrics>,
}

impl SegmentContext {
    fn expected_status(&self) -> StatusCode {
        if self.supports_range {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }
}

/// Drive one segment to a terminal state
pub async fn run_segment(ctx: Arc<SegmentContext>, segment: Segment) -> SegmentResult {
    let outcome = download_with_retry(&ctx, &segment).await;
    SegmentResult { segment, outcome }
}

async fn download_with_retry(ctx: &SegmentContext, segment: &Segment) -> Result<u64> {
    let max_attempts = ctx.config.max_attempts;
    let mut progress = SegmentProgress::new(Arc::clone(&ctx.tracker), segment.index);
    let mut attempt: u32 = 0;

    ctx.metrics.record_segment_started();

    loop {
        if ctx.signal.is_cancelled() {
            return Err(ctx.signal.error());
        }

        if attempt > 0 {
            let delay = ctx.config.get_retry_delay(attempt);
            ctx.tracker.emit(ProgressEvent::RetryScheduled {
                index: segment.index,
                attempt,
                max_attempts,
                delay,
            });
            tokio::select! {
                biased;
                _ = ctx.signal.cancelled() => return Err(ctx.signal.error()),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        ctx.tracker.emit(ProgressEvent::SegmentStarted {
            index: segment.index,
            attempt,
        });

        match fetch_once(ctx, segment, &mut progress).await {
            Ok(bytes) => {
                debug!(segment = segment.index, bytes, attempt, "Segment finished");
                ctx.metrics.record_segment_completed(bytes);
                ctx.tracker.emit(ProgressEvent::SegmentCompleted {
                    index: segment.index,
                    bytes,
                });
                return Ok(bytes);
            }
            Err(e) if !e.is_retryable() => {
                progress.rollback();
                return Err(e);
            }
            Err(e) => {
                let rolled_back = progress.rollback();
                attempt += 1;

                if attempt >= max_attempts {
                    warn!(
                        segment = segment.index,
                        "Giving up after {} attempts: {}", attempt, e
                    );
                    ctx.metrics.record_segment_failed();
                    // Raised here so no sibling enters another attempt meanwhile
                    ctx.signal.cancel(CancelCause::SegmentFailed {
                        index: segment.index,
                    });
                    return Err(DownloadError::SegmentFailed {
                        index: segment.index,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                debug!(
                    segment = segment.index,
                    rolled_back, "Attempt {}/{} failed: {}", attempt, max_attempts, e
                );
                ctx.metrics.record_retry(rolled_back);
            }
        }
    }
}

/// One request/stream attempt into the segment's temporary file
async fn fetch_once(
    ctx: &SegmentContext,
    segment: &Segment,
    progress: &mut SegmentProgress,
) -> Result<u64> {
    let mut request = ctx.client.get(&ctx.url);
    if ctx.supports_range {
        request = request.header(header::RANGE, segment.range_header());
    }

    let response = tokio::select! {
        biased;
        _ = ctx.signal.cancelled() => return Err(ctx.signal.error()),
        sent = request.send() => sent.map_err(|e| DownloadError::http(&ctx.url, e))?,
    };

    let expected = ctx.expected_status();
    if response.status() != expected {
        return Err(DownloadError::UnexpectedStatus {
            index: segment.index,
            expected: expected.as_u16(),
            actual: response.status().as_u16(),
        });
    }

    // Truncates whatever a previous attempt left behind
    let mut file = File::create(&segment.temp_path)
        .await
        .map_err(|e| DownloadError::fs(&segment.temp_path, FileOperation::Create, e))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.signal.cancelled() => return Err(ctx.signal.error()),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| DownloadError::http(&ctx.url, e))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::fs(&segment.temp_path, FileOperation::Write, e))?;
        written += chunk.len() as u64;
        progress.record(chunk.len() as u64);
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::fs(&segment.temp_path, FileOperation::Write, e))?;

    if written != segment.len() {
        return Err(DownloadError::SegmentLengthMismatch {
            index: segment.index,
            expected: segment.len(),
            actual: written,
        });
    }

    Ok(written)
}
