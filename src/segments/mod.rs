/// User-editable ad segments
///
/// A fresh `SegmentModel` is built for every detection run. The scheduler reads
/// `effective_ranges()` on each tick, so edits apply without a restart.

pub mod gesture;

pub use gesture::{GestureOutcome, GestureTracker, Handle};

use crate::detection::TimeRange;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shortest segment a resize may produce, in seconds
pub const MIN_SEGMENT_LENGTH: f64 = 0.5;

/// One ad range as shown to and edited by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSegment {
    pub id: String,
    pub start: f64,
    pub end: f64,
    /// `false` means a known ad the user chose to keep
    pub active: bool,
}

impl AdSegment {
    pub fn range(&self) -> TimeRange {
        (self.start, self.end)
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }
}

/// Ordered set of segments for the current video
#[derive(Debug, Clone, Default)]
pub struct SegmentModel {
    segments: Vec<AdSegment>,
    duration: f64,
}

impl SegmentModel {
    /// Build one active segment per range, clamped to `[0, duration]`.
    ///
    /// A non-positive `duration` is treated as unknown and replaced by the
    /// largest range end. `stamp` makes ids unique per construction, e.g. the
    /// run start time in ms.
    pub fn from_ranges(ranges: &[TimeRange], duration: f64, stamp: i64) -> Self {
        let duration = if duration > 0.0 {
            duration
        } else {
            ranges.iter().map(|range| range.1).fold(0.0, f64::max)
        };

        let segments = ranges
            .iter()
            .enumerate()
            .map(|(index, &(start, end))| {
                let start = start.clamp(0.0, duration);
                AdSegment {
                    id: format!("ad-seg-{}-{}", stamp, index),
                    start,
                    end: end.clamp(start, duration),
                    active: true,
                }
            })
            .collect();

        Self { segments, duration }
    }

    pub fn segments(&self) -> &[AdSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn get(&self, segment_id: &str) -> Option<&AdSegment> {
        self.segments.iter().find(|segment| segment.id == segment_id)
    }

    fn get_mut(&mut self, segment_id: &str) -> Option<&mut AdSegment> {
        let found = self.segments.iter_mut().find(|segment| segment.id == segment_id);
        if found.is_none() {
            debug!("Unknown segment {}", segment_id);
        }
        found
    }

    /// Ranges of active segments, in construction order
    pub fn effective_ranges(&self) -> Vec<TimeRange> {
        self.segments
            .iter()
            .filter(|segment| segment.active)
            .map(AdSegment::range)
            .collect()
    }

    /// Ranges of every segment, active or not
    pub fn all_ranges(&self) -> Vec<TimeRange> {
        self.segments.iter().map(AdSegment::range).collect()
    }

    /// Flip the active flag; returns false for an unknown id
    pub fn toggle_active(&mut self, segment_id: &str) -> bool {
        let Some(segment) = self.get_mut(segment_id) else {
            return false;
        };
        segment.active = !segment.active;
        true
    }

    /// Shift both bounds by `delta`, keeping the segment inside `[0, duration]`
    pub fn move_segment(&mut self, segment_id: &str, delta: f64) -> bool {
        let duration = self.duration;
        let Some(segment) = self.get_mut(segment_id) else {
            return false;
        };

        let length = segment.len().min(duration);
        let start = (segment.start + delta).clamp(0.0, duration - length);
        segment.start = start;
        segment.end = (start + length).min(duration);
        true
    }

    /// Move the start bound, keeping at least [`MIN_SEGMENT_LENGTH`] before the end
    pub fn resize_start(&mut self, segment_id: &str, new_start: f64) -> bool {
        let Some(segment) = self.get_mut(segment_id) else {
            return false;
        };

        let upper = (segment.end - MIN_SEGMENT_LENGTH).max(0.0);
        segment.start = new_start.clamp(0.0, upper);
        true
    }

    /// Move the end bound, keeping at least [`MIN_SEGMENT_LENGTH`] after the start
    pub fn resize_end(&mut self, segment_id: &str, new_end: f64) -> bool {
        let duration = self.duration;
        let Some(segment) = self.get_mut(segment_id) else {
            return false;
        };

        let lower = (segment.start + MIN_SEGMENT_LENGTH).min(duration).max(segment.start);
        segment.end = new_end.clamp(lower, duration.max(lower));
        true
    }

    /// Restore bounds captured earlier, e.g. at the start of a drag
    pub(crate) fn place(&mut self, segment_id: &str, start: f64, end: f64) -> bool {
        let Some(segment) = self.get_mut(segment_id) else {
            return false;
        };
        segment.start = start;
        segment.end = end;
        true
    }
}
