/// Per-video session state
///
/// One `DetectionSession` is owned by whoever drives playback. Every detection
/// run resets it, so nothing leaks from one video to the next.
use crate::config::SchedulerConfig;
use crate::player::{manual_skip, AutoSkipScheduler, NotificationAction, PlaybackClock, SchedulerEvent};
use crate::segments::{GestureOutcome, GestureTracker, Handle, SegmentModel};

/// Status text shown before any run has reported
pub const DEFAULT_STATUS: &str = "Detection not finished yet";

/// Short user-facing status messages, joined with ` | `
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusLog {
    entries: Vec<String>,
}

impl StatusLog {
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(message.into());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Latest status, or [`DEFAULT_STATUS`] when nothing was reported
    pub fn text(&self) -> String {
        if self.entries.is_empty() {
            DEFAULT_STATUS.to_string()
        } else {
            self.entries.join(" | ")
        }
    }
}

/// Segments, scheduler and status for the video currently playing
#[derive(Debug, Clone)]
pub struct DetectionSession {
    video_id: Option<String>,
    segments: SegmentModel,
    scheduler: AutoSkipScheduler,
    gesture: GestureTracker,
    status: StatusLog,
    manual_skip_lookahead: f64,
}

impl DetectionSession {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            video_id: None,
            segments: SegmentModel::default(),
            manual_skip_lookahead: config.manual_skip_lookahead_seconds,
            scheduler: AutoSkipScheduler::new(config),
            gesture: GestureTracker::new(),
            status: StatusLog::default(),
        }
    }

    /// Start over for `video_id`
    pub fn reset(&mut self, video_id: &str) {
        self.teardown();
        self.status.clear();
        self.video_id = Some(video_id.to_string());
    }

    /// Drop segments and stop auto-skip, keeping the status log
    pub fn teardown(&mut self) {
        self.segments = SegmentModel::default();
        self.scheduler.detach();
        self.gesture.cancel();
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn segments(&self) -> &SegmentModel {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut SegmentModel {
        &mut self.segments
    }

    pub fn set_segments(&mut self, segments: SegmentModel) {
        self.gesture.cancel();
        self.segments = segments;
    }

    pub fn scheduler(&self) -> &AutoSkipScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut AutoSkipScheduler {
        &mut self.scheduler
    }

    pub fn status(&self) -> &StatusLog {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusLog {
        &mut self.status
    }

    /// Feed a position update to the scheduler using the current active ranges
    pub fn tick(&mut self, now_ms: i64, player: &mut dyn PlaybackClock) -> Option<SchedulerEvent> {
        let ranges = self.segments.effective_ranges();
        self.scheduler.tick(now_ms, player, &ranges)
    }

    pub fn click_notification(&mut self, player: &mut dyn PlaybackClock) -> Option<NotificationAction> {
        self.scheduler.click_notification(player)
    }

    /// Skip button press
    pub fn manual_skip(&mut self, player: &mut dyn PlaybackClock) -> Option<f64> {
        manual_skip(player, &self.segments.effective_ranges(), self.manual_skip_lookahead)
    }

    pub fn pointer_down(&mut self, segment_id: &str, handle: Handle, x: f64) -> bool {
        self.gesture.pointer_down(&self.segments, segment_id, handle, x)
    }

    pub fn pointer_move(&mut self, x: f64, layer_width: f64) {
        self.gesture.pointer_move(&mut self.segments, x, layer_width);
    }

    pub fn pointer_up(&mut self) -> GestureOutcome {
        self.gesture.pointer_up(&mut self.segments)
    }
}
