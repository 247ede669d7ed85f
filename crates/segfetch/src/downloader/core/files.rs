//! File operation utilities
//!
//! Temporary segment naming, unconditional cleanup and ordered reassembly.

use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{DownloadError, FileOperation, Result, Segment};

/// Deterministic naming of per-segment temporary files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNaming {
    dir: PathBuf,
    stem: String,
}

impl SegmentNaming {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, stem: S) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// `<dir>/<stem>_segment_<index>`
    pub fn temp_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}_segment_{}", self.stem, index))
    }

    /// `<dir>/<stem>.<extension>`
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, extension))
    }
}

/// Remove a file, treating "already gone" as success
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    removal_outcome(path, fs::remove_file(path).await)
}

// Only for `Drop`, where no runtime can be awaited
fn remove_if_exists_blocking(path: &Path) -> Result<()> {
    removal_outcome(path, std::fs::remove_file(path))
}

fn removal_outcome(path: &Path, outcome: std::io::Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::fs(path, FileOperation::Delete, e)),
    }
}

/// The ordered segment set of a session
///
/// Owns every segment's temporary file and removes them all when dropped,
/// so cleanup runs on every exit path. [`SegmentSet::cleanup`] removes them
/// without blocking the runtime; once it has succeeded the drop is a no-op.
/// Repeated calls are harmless.
#[derive(Debug)]
pub struct SegmentSet {
    segments: Vec<Segment>,
    cleaned: AtomicBool,
}

impl SegmentSet {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    /// Remove every temporary file. Failures are logged, never returned, so
    /// cleanup cannot mask the session's real error.
    pub async fn cleanup(&self) {
        let mut clean = true;
        for segment in &self.segments {
            if let Err(e) = remove_if_exists(&segment.temp_path).await {
                warn!("Failed to remove temporary segment {}: {}", segment.index, e);
                clean = false;
            }
        }
        self.cleaned.store(clean, Ordering::Release);
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::Acquire)
    }
}

impl Deref for SegmentSet {
    type Target = [Segment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl Drop for SegmentSet {
    fn drop(&mut self) {
        if self.is_cleaned() {
            return;
        }
        for segment in &self.segments {
            if let Err(e) = remove_if_exists_blocking(&segment.temp_path) {
                warn!("Failed to remove temporary segment {}: {}", segment.index, e);
            }
        }
    }
}

/// Concatenate segment files into `output_path` in ascending index order
///
/// Streams each input; nothing is buffered whole in memory. On failure the
/// partially written output is removed and the offending segment reported.
pub async fn merge_segments(segments: &[Segment], output_path: &Path) -> Result<u64> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|segment| segment.index);

    let mut out = fs::File::create(output_path)
        .await
        .map_err(|e| DownloadError::fs(output_path, FileOperation::Create, e))?;

    let mut written = 0u64;
    for segment in ordered {
        match append_segment(&mut out, segment).await {
            Ok(copied) => written += copied,
            Err(source) => {
                drop(out);
                if let Err(e) = remove_if_exists(output_path).await {
                    warn!("Failed to remove partial output {}: {}", output_path.display(), e);
                }
                return Err(DownloadError::Merge {
                    index: segment.index,
                    output: output_path.to_path_buf(),
                    source,
                });
            }
        }
    }

    out.flush()
        .await
        .map_err(|e| DownloadError::fs(output_path, FileOperation::Write, e))?;

    debug!("Merged {} bytes into {}", written, output_path.display());
    Ok(written)
}

async fn append_segment(out: &mut fs::File, segment: &Segment) -> std::io::Result<u64> {
    let mut input = fs::File::open(&segment.temp_path).await?;
    tokio::io::copy(&mut input, out).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn segment(naming: &SegmentNaming, index: usize, start: u64, end: u64) -> Segment {
        Segment {
            index,
            start,
            end,
            temp_path: naming.temp_path(index),
        }
    }

    #[test]
    fn naming_is_deterministic() {
        let naming = SegmentNaming::new("/data", "movie");
        assert_eq!(naming.temp_path(3), PathBuf::from("/data/movie_segment_3"));
        assert_eq!(naming.output_path("mp4"), PathBuf::from("/data/movie.mp4"));
    }

    #[tokio::test]
    async fn merge_follows_index_order() {
        let dir = tempdir().unwrap();
        let naming = SegmentNaming::new(dir.path(), "out");
        let segments = vec![
            segment(&naming, 1, 3, 5),
            segment(&naming, 0, 0, 2),
            segment(&naming, 2, 6, 7),
        ];
        tokio::fs::write(&segments[0].temp_path, b"def").await.unwrap();
        tokio::fs::write(&segments[1].temp_path, b"abc").await.unwrap();
        tokio::fs::write(&segments[2].temp_path, b"gh").await.unwrap();

        let output = naming.output_path("txt");
        let written = merge_segments(&segments, &output).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn merge_reports_missing_segment_and_removes_output() {
        let dir = tempdir().unwrap();
        let naming = SegmentNaming::new(dir.path(), "out");
        let segments = vec![segment(&naming, 0, 0, 2), segment(&naming, 1, 3, 5)];
        tokio::fs::write(&segments[0].temp_path, b"abc").await.unwrap();

        let output = naming.output_path("bin");
        let err = merge_segments(&segments, &output).await.unwrap_err();

        match err {
            DownloadError::Merge { index, .. } => assert_eq!(index, 1),
            other => panic!("Expected Merge error, got {other:?}"),
        }
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn cleanup_twice_is_harmless() {
        let dir = tempdir().unwrap();
        let naming = SegmentNaming::new(dir.path(), "x");
        let set = SegmentSet::new(vec![segment(&naming, 0, 0, 0), segment(&naming, 1, 1, 1)]);
        tokio::fs::write(&set[0].temp_path, b"a").await.unwrap();
        // segment 1 was never written

        set.cleanup().await;
        set.cleanup().await;
        assert!(set.is_cleaned());
        assert!(!set[0].temp_path.exists());
        assert!(!set[1].temp_path.exists());
    }

    #[test]
    fn drop_removes_files_without_explicit_cleanup() {
        let dir = tempdir().unwrap();
        let naming = SegmentNaming::new(dir.path(), "x");
        let set = SegmentSet::new(vec![segment(&naming, 0, 0, 0), segment(&naming, 1, 1, 1)]);
        let paths: Vec<PathBuf> = set.iter().map(|s| s.temp_path.clone()).collect();
        std::fs::write(&paths[0], b"a").unwrap();
        std::fs::write(&paths[1], b"b").unwrap();

        assert!(!set.is_cleaned());
        drop(set);
        assert!(paths.iter().all(|p| !p.exists()));
    }
}
