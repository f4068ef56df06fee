/// Ad detection result handling
///
/// This module turns untrusted model output into validated index intervals
/// (`sanitizer`) and maps those intervals onto wall-clock ranges with a
/// confidence verdict (`reconciler`).

pub mod sanitizer;
pub mod reconciler;

// Re-export main types
pub use reconciler::{IntervalReconciler, Reconciliation};
pub use sanitizer::{ResultSanitizer, SanitizeReport};

use serde::{Deserialize, Serialize};

/// Pair of caption/transcript entry indices delimiting a claimed ad segment
pub type IndexInterval = (i64, i64);

/// Ad segment in wall-clock seconds, `(start, end)`
pub type TimeRange = (f64, f64);

/// Detection verdict as claimed by the model, after coercion and interval cleaning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Whether an ad exists in the video
    pub exist: bool,
    /// Advertised product names
    pub good_name: Vec<String>,
    /// Claimed ad intervals, by caption index
    pub index_lists: Vec<IndexInterval>,
}

impl RawDetection {
    /// The detection returned for any malformed input
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Run-level failures that are surfaced to the caller
#[derive(thiserror::Error, Debug)]
pub enum DetectionError {
    #[error("Malformed detection: {0}")]
    StructurallyInvalid(String),

    #[error("{0}")]
    Collaborator(String),

    #[error("Video player not found")]
    MissingPlayer,
}

impl DetectionError {
    /// Wrap a collaborator failure, keeping its message chain
    pub fn collaborator(err: anyhow::Error) -> Self {
        DetectionError::Collaborator(format!("{:#}", err))
    }
}

/// Sort intervals by `(start, end)` and merge any two that overlap, touch, or
/// leave at most one index uncovered between them.
///
/// `[[0,2],[3,5]]` and `[[0,2],[4,5]]` both become `[[0,5]]`; `[[0,2],[5,6]]` is left alone.
pub fn merge_index_intervals(intervals: &[IndexInterval]) -> Vec<IndexInterval> {
    let mut sorted = intervals.to_vec();
    sorted.sort();

    let mut merged: Vec<IndexInterval> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 2 => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_gap_tolerance() {
        assert_eq!(merge_index_intervals(&[(0, 2), (3, 5)]), vec![(0, 5)]);
        assert_eq!(merge_index_intervals(&[(0, 2), (4, 5)]), vec![(0, 5)]);
        assert_eq!(merge_index_intervals(&[(0, 2), (5, 6)]), vec![(0, 2), (5, 6)]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_index_intervals(&[(10, 12), (0, 3), (2, 4), (20, 20), (13, 15)]);
        assert_eq!(once, vec![(0, 4), (10, 15), (20, 20)]);
        assert_eq!(merge_index_intervals(&once), once);
    }

    #[test]
    fn test_merge_contained_interval() {
        assert_eq!(merge_index_intervals(&[(0, 10), (2, 3)]), vec![(0, 10)]);
        assert!(merge_index_intervals(&[]).is_empty());
    }
}
