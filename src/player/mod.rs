/// Playback clock abstraction and skip helpers

pub mod scheduler;

pub use scheduler::{AutoSkipScheduler, Notification, NotificationAction, SchedulerEvent};

use crate::detection::TimeRange;
use crate::segments::SegmentModel;
use tracing::{debug, info};

/// The video being played
pub trait PlaybackClock: Send {
    /// Current position in seconds
    fn position(&self) -> f64;

    /// Total length in seconds
    fn duration(&self) -> f64;

    fn seek(&mut self, position: f64);
}

/// In-memory player for the CLI and tests
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    position: f64,
    duration: f64,
    /// Every seek target, in order
    seeks: Vec<f64>,
}

impl SimulatedPlayer {
    pub fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            duration: duration.max(0.0),
            seeks: Vec::new(),
        }
    }

    /// Play forward by `seconds`, stopping at the end
    pub fn advance(&mut self, seconds: f64) {
        self.position = (self.position + seconds).clamp(0.0, self.duration);
    }

    /// Set the position without recording a seek
    pub fn set_position(&mut self, position: f64) {
        self.position = position.clamp(0.0, self.duration);
    }

    pub fn seeks(&self) -> &[f64] {
        &self.seeks
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.duration
    }
}

impl PlaybackClock for SimulatedPlayer {
    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek(&mut self, position: f64) {
        self.position = position.clamp(0.0, self.duration);
        self.seeks.push(self.position);
    }
}

/// Format seconds as `mm:ss`, or `h:mm:ss` past the first hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format ranges as `mm:ss~mm:ss | mm:ss~mm:ss`
pub fn format_ranges(ranges: &[TimeRange]) -> String {
    ranges
        .iter()
        .map(|&(start, end)| format!("{}~{}", format_timestamp(start), format_timestamp(end)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Where the skip button jumps to: the end of the first range whose window
/// `[max(start - lookahead, 0), end)` contains `position`
pub fn manual_skip_target(position: f64, ranges: &[TimeRange], lookahead: f64) -> Option<f64> {
    ranges
        .iter()
        .find(|&&(start, end)| position >= (start - lookahead).max(0.0) && position < end)
        .map(|&(_, end)| end)
}

/// Handle a skip button press; returns the seek target if a jump happened
pub fn manual_skip(player: &mut dyn PlaybackClock, ranges: &[TimeRange], lookahead: f64) -> Option<f64> {
    let position = player.position();
    let target = manual_skip_target(position, ranges, lookahead)?;

    player.seek(target);
    info!("⏭️ Skipped ad manually: {} -> {}", format_timestamp(position), format_timestamp(target));
    Some(target)
}

/// Play `player` to its end, ticking the scheduler after each step.
///
/// Each step advances playback by `step_seconds` and wall time by `step_ms`.
/// Ranges are re-read from `model` on every tick.
pub fn simulate_playback(
    scheduler: &mut AutoSkipScheduler,
    model: &SegmentModel,
    player: &mut SimulatedPlayer,
    start_ms: i64,
    step_seconds: f64,
    step_ms: i64,
) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    let mut now_ms = start_ms;

    if step_seconds <= 0.0 {
        return events;
    }

    while !player.is_finished() {
        if let Some(event) = scheduler.tick(now_ms, player, &model.effective_ranges()) {
            debug!("t={:.1}s {:?}", player.position(), event);
            events.push(event);
        }
        player.advance(step_seconds);
        now_ms += step_ms;
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.9), "01:05");
        assert_eq!(format_timestamp(3599.0), "59:59");
        assert_eq!(format_timestamp(3661.0), "1:01:01");
        assert_eq!(format_timestamp(-4.0), "00:00");
    }

    #[test]
    fn test_format_ranges() {
        assert_eq!(format_ranges(&[(30.0, 40.0), (70.0, 85.5)]), "00:30~00:40 | 01:10~01:25");
        assert_eq!(format_ranges(&[]), "");
    }

    #[test]
    fn test_manual_skip_window() {
        let ranges = [(30.0, 40.0), (5.0, 8.0)];
        assert_eq!(manual_skip_target(19.9, &ranges, 10.0), None);
        assert_eq!(manual_skip_target(20.0, &ranges, 10.0), Some(40.0));
        assert_eq!(manual_skip_target(39.9, &ranges, 10.0), Some(40.0));
        assert_eq!(manual_skip_target(40.0, &ranges, 10.0), None);
        // Window start is clamped at zero
        assert_eq!(manual_skip_target(0.0, &ranges, 10.0), Some(8.0));
    }

    #[test]
    fn test_manual_skip_seeks() {
        let mut player = SimulatedPlayer::new(100.0);
        player.set_position(25.0);
        assert_eq!(manual_skip(&mut player, &[(30.0, 40.0)], 10.0), Some(40.0));
        assert_eq!(player.position(), 40.0);
        assert_eq!(manual_skip(&mut player, &[(30.0, 40.0)], 10.0), None);
        assert_eq!(player.seeks(), &[40.0]);
    }

    #[test]
    fn test_simulated_player_clamps() {
        let mut player = SimulatedPlayer::new(10.0);
        player.advance(15.0);
        assert!(player.is_finished());
        player.seek(-1.0);
        assert_eq!(player.position(), 0.0);
    }
}
