//! Segment planning
//!
//! Splits `[0, total_size)` into contiguous, non-overlapping inclusive ranges.

use crate::downloader::core::files::SegmentNaming;
use crate::downloader::core::{DownloadError, ProbeResult, Result, Segment};

/// Segment count actually used for a probed resource
///
/// Without range support only a single full-body request is possible. The
/// count never exceeds the byte count so no segment is empty.
pub fn effective_segment_count(probe: &ProbeResult, desired: usize) -> usize {
    if !probe.supports_range {
        return 1;
    }
    let total = usize::try_from(probe.total_size).unwrap_or(usize::MAX);
    desired.min(total).max(1)
}

/// Compute the segment layout for a probed resource
///
/// Each segment but the last covers `total / n` bytes; the last absorbs the
/// remainder and always ends at `total - 1`.
pub fn plan_segments(
    probe: &ProbeResult,
    desired: usize,
    naming: &SegmentNaming,
) -> Result<Vec<Segment>> {
    if desired == 0 {
        return Err(DownloadError::Configuration {
            message: "segment count must be at least 1".to_string(),
            field: Some("segments".to_string()),
            suggestion: None,
        });
    }
    if probe.total_size == 0 {
        return Err(DownloadError::Configuration {
            message: "cannot plan segments for an empty resource".to_string(),
            field: None,
            suggestion: None,
        });
    }

    let count = effective_segment_count(probe, desired);
    let total = probe.total_size;
    let size = total / count as u64;

    let segments = (0..count)
        .map(|index| {
            let start = index as u64 * size;
            let end = if index + 1 == count {
                total - 1
            } else {
                start + size - 1
            };
            Segment {
                index,
                start,
                end,
                temp_path: naming.temp_path(index),
            }
        })
        .collect();

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(total_size: u64, supports_range: bool) -> ProbeResult {
        ProbeResult {
            total_size,
            supports_range,
        }
    }

    fn naming() -> SegmentNaming {
        SegmentNaming::new("/tmp", "file")
    }

    fn bounds(segments: &[Segment]) -> Vec<(u64, u64)> {
        segments.iter().map(|s| (s.start, s.end)).collect()
    }

    #[test]
    fn even_split_of_one_million() {
        let segments = plan_segments(&probe(1_000_000, true), 4, &naming()).unwrap();
        assert_eq!(
            bounds(&segments),
            vec![
                (0, 249_999),
                (250_000, 499_999),
                (500_000, 749_999),
                (750_000, 999_999)
            ]
        );
        assert_eq!(segments[2].range_header(), "bytes=500000-749999");
        assert_eq!(segments[3].temp_path, std::path::PathBuf::from("/tmp/file_segment_3"));
    }

    #[test]
    fn last_segment_absorbs_remainder() {
        let segments = plan_segments(&probe(10, true), 3, &naming()).unwrap();
        assert_eq!(bounds(&segments), vec![(0, 2), (3, 5), (6, 9)]);
    }

    #[test]
    fn count_is_clamped_to_byte_count() {
        let segments = plan_segments(&probe(3, true), 8, &naming()).unwrap();
        assert_eq!(bounds(&segments), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn no_range_support_means_single_segment() {
        let segments = plan_segments(&probe(5_000, false), 8, &naming()).unwrap();
        assert_eq!(bounds(&segments), vec![(0, 4_999)]);
    }

    #[test]
    fn zero_segments_rejected() {
        assert!(plan_segments(&probe(100, true), 0, &naming()).is_err());
    }

    #[test]
    fn segments_tile_the_resource() {
        for total in [1u64, 2, 7, 15, 16, 17, 999, 65_536, 1_000_003] {
            for desired in 1..=16 {
                let segments = plan_segments(&probe(total, true), desired, &naming()).unwrap();
                assert_eq!(segments[0].start, 0);
                assert_eq!(segments.last().unwrap().end, total - 1);
                for pair in segments.windows(2) {
                    assert_eq!(pair[1].start, pair[0].end + 1);
                }
                let covered: u64 = segments.iter().map(Segment::len).sum();
                assert_eq!(covered, total);
                assert!(segments.iter().enumerate().all(|(i, s)| s.index == i));
            }
        }
    }
}
