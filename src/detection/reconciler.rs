/// Mapping of index intervals onto wall-clock ranges, with confidence scoring
use super::{merge_index_intervals, IndexInterval, TimeRange};
use crate::transcription::TimingTable;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// More raw intervals than this makes a detection too scattered to auto-apply
pub const MAX_CONFIDENT_INTERVALS: usize = 3;

/// Ads must cover strictly less than this share of the video to auto-apply
pub const MAX_CONFIDENT_AD_RATIO: f64 = 0.5;

/// Result of reconciling one detection against its timing table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Merged ad ranges in seconds
    pub ranges: Vec<TimeRange>,
    /// Intervals left after dedup, before merging
    pub raw_interval_count: usize,
    /// Sum of `end - start` over `ranges`
    pub total_ad_duration: f64,
    /// Whether the detection may be auto-skipped
    pub confident: bool,
}

/// Turns index intervals into second ranges
pub struct IntervalReconciler;

impl IntervalReconciler {
    /// Run dedup, merge, mapping and scoring in one pass
    pub fn reconcile(
        intervals: &[IndexInterval],
        timing: &TimingTable,
        video_duration: f64,
    ) -> Reconciliation {
        let valid = Self::dedupe(intervals);
        let merged = merge_index_intervals(&valid);
        let ranges: Vec<TimeRange> = Self::to_second_ranges(&merged, timing)
            .into_iter()
            .filter(|&(start, end)| {
                if end < start {
                    warn!("Dropping inverted range {:.1}~{:.1}, index past the timing table", start, end);
                    return false;
                }
                true
            })
            .collect();

        let total_ad_duration = total_duration(&ranges);
        let confident = Self::is_confident(&ranges, valid.len(), video_duration);

        info!(
            "🧮 Reconciled {} interval(s) into {} range(s), {:.1}s of ads in {:.1}s video (confident: {})",
            valid.len(),
            ranges.len(),
            total_ad_duration,
            video_duration,
            confident
        );

        Reconciliation {
            ranges,
            raw_interval_count: valid.len(),
            total_ad_duration,
            confident,
        }
    }

    /// Discard reversed intervals and exact duplicates, keeping first occurrences in order
    pub fn dedupe(intervals: &[IndexInterval]) -> Vec<IndexInterval> {
        let mut valid: Vec<IndexInterval> = Vec::with_capacity(intervals.len());

        for &(start, end) in intervals {
            if end < start {
                debug!("Dropping reversed interval [{}, {}]", start, end);
                continue;
            }
            if valid.contains(&(start, end)) {
                continue;
            }
            valid.push((start, end));
        }

        valid
    }

    /// Resolve `[a, b]` to `(timing[a].from, timing[b].to)`; unknown indices read as 0
    pub fn to_second_ranges(intervals: &[IndexInterval], timing: &TimingTable) -> Vec<TimeRange> {
        intervals
            .iter()
            .map(|&(a, b)| {
                let start = timing.get(a).map(|entry| entry.from).unwrap_or(0.0);
                let end = timing.get(b).map(|entry| entry.to).unwrap_or(0.0);
                (start, end)
            })
            .collect()
    }

    /// Confidence gate for automatic skipping.
    ///
    /// Requires at least one range, at most three raw intervals, and ads shorter than
    /// half the video.
    pub fn is_confident(ranges: &[TimeRange], raw_interval_count: usize, video_duration: f64) -> bool {
        !ranges.is_empty()
            && raw_interval_count <= MAX_CONFIDENT_INTERVALS
            && total_duration(ranges) < video_duration * MAX_CONFIDENT_AD_RATIO
    }
}

fn total_duration(ranges: &[TimeRange]) -> f64 {
    ranges.iter().map(|(start, end)| end - start).sum()
}
