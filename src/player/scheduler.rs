/// Automatic ad skipping driven by playback position
///
/// The scheduler owns no timers. A driver calls [`AutoSkipScheduler::tick`]
/// whenever the playback position changes; ticks closer together than the poll
/// interval are ignored.
///
/// Each range is tracked by an instance key built from its bounds, so an edited
/// segment gets a fresh notify/skip history.
use super::{format_timestamp, PlaybackClock};
use crate::config::SchedulerConfig;
use crate::detection::TimeRange;
use std::collections::HashSet;
use tracing::{debug, info};

/// Text shown on the cancellable notification
pub const NOTIFICATION_MESSAGE: &str = "Skipping ad soon (click to cancel)";

/// A state transition taken during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Playback is about to enter a range; a notification is showing
    Notified { key: String, range: TimeRange },
    /// Playback was inside a range and jumped to `target`
    Skipped { key: String, range: TimeRange, target: f64 },
}

/// Result of clicking the notification
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationAction {
    /// Clicked before the range started: the skip will not happen
    Cancel { key: String },
    /// Clicked after the range was skipped: playback went back to `target`
    JumpBack { key: String, target: f64 },
    /// Any other click: stop skipping the current range
    CancelCurrent { key: String },
}

/// The notification currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub key: String,
    pub range: TimeRange,
    pub message: String,
    pub shown_at_ms: i64,
}

/// Instance key of a range
pub fn range_key(range: TimeRange) -> String {
    format!("{}-{}", range.0, range.1)
}

/// Per-session auto-skip state machine
#[derive(Debug, Clone)]
pub struct AutoSkipScheduler {
    config: SchedulerConfig,
    attached: bool,
    skipped: HashSet<String>,
    notified: HashSet<String>,
    last_check_ms: Option<i64>,
    notification: Option<Notification>,
}

impl AutoSkipScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            attached: false,
            skipped: HashSet::new(),
            notified: HashSet::new(),
            last_check_ms: None,
            notification: None,
        }
    }

    /// Start listening; any previous state is discarded first
    pub fn attach(&mut self) {
        self.detach();
        self.attached = true;
        info!("👂 Auto-skip attached");
    }

    /// Stop listening and forget every instance
    pub fn detach(&mut self) {
        if self.attached {
            debug!("Auto-skip detached");
        }
        self.attached = false;
        self.skipped.clear();
        self.notified.clear();
        self.last_check_ms = None;
        self.notification = None;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn is_skipped(&self, range: TimeRange) -> bool {
        self.skipped.contains(&range_key(range))
    }

    pub fn is_notified(&self, range: TimeRange) -> bool {
        self.notified.contains(&range_key(range))
    }

    /// Hide the notification once it has been visible for the configured timeout
    pub fn expire_notification(&mut self, now_ms: i64) -> bool {
        let expired = self
            .notification
            .as_ref()
            .is_some_and(|n| now_ms - n.shown_at_ms >= self.config.notification_timeout_ms);
        if expired {
            self.notification = None;
        }
        expired
    }

    /// Evaluate the current position against `ranges`.
    ///
    /// Ranges are checked in ascending start order and at most one transition
    /// is taken per tick.
    pub fn tick(
        &mut self,
        now_ms: i64,
        player: &mut dyn PlaybackClock,
        ranges: &[TimeRange],
    ) -> Option<SchedulerEvent> {
        if !self.attached {
            return None;
        }

        self.expire_notification(now_ms);

        if let Some(last) = self.last_check_ms {
            if now_ms - last < self.config.poll_interval_ms {
                return None;
            }
        }
        self.last_check_ms = Some(now_ms);

        let position = player.position();
        let mut ordered = ranges.to_vec();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        for range in ordered {
            let (start, end) = range;
            let key = range_key(range);

            let time_to_start = start - position;
            if time_to_start > 0.0
                && time_to_start <= self.config.notify_lead_seconds
                && !self.notified.contains(&key)
            {
                self.notified.insert(key.clone());
                self.notification = Some(Notification {
                    key: key.clone(),
                    range,
                    message: NOTIFICATION_MESSAGE.to_string(),
                    shown_at_ms: now_ms,
                });
                info!("🔔 Ad ahead at {}", format_timestamp(start));
                return Some(SchedulerEvent::Notified { key, range });
            }

            if position >= start && position < end && !self.skipped.contains(&key) {
                let overshoot = end + self.config.skip_overshoot_seconds;
                let duration = player.duration();
                let target = if duration > 0.0 { overshoot.min(duration) } else { overshoot };

                player.seek(target);
                self.skipped.insert(key.clone());
                info!(
                    "⏭️ Auto-skipped ad {}~{} to {}",
                    format_timestamp(start),
                    format_timestamp(end),
                    format_timestamp(target)
                );
                return Some(SchedulerEvent::Skipped { key, range, target });
            }
        }

        None
    }

    /// Resolve a click on the visible notification, then hide it
    pub fn click_notification(&mut self, player: &mut dyn PlaybackClock) -> Option<NotificationAction> {
        let notification = self.notification.take()?;
        let (start, end) = notification.range;
        let key = notification.key;
        let position = player.position();
        let already_skipped = self.skipped.contains(&key);

        let action = if !already_skipped && position < start {
            self.skipped.insert(key.clone());
            info!("🙅 Skip cancelled for {}", key);
            NotificationAction::Cancel { key }
        } else if already_skipped && position > end - self.config.jump_back_offset_seconds {
            let target = (start - self.config.jump_back_offset_seconds).max(0.0);
            player.seek(target);
            info!("⏪ Jumped back to {}", format_timestamp(target));
            NotificationAction::JumpBack { key, target }
        } else {
            self.skipped.insert(key.clone());
            info!("🙅 Skip cancelled for current ad {}", key);
            NotificationAction::CancelCurrent { key }
        };

        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::SimulatedPlayer;

    const AD: TimeRange = (30.0, 40.0);

    fn attached() -> AutoSkipScheduler {
        let mut scheduler = AutoSkipScheduler::new(SchedulerConfig::default());
        scheduler.attach();
        scheduler
    }

    fn player_at(position: f64) -> SimulatedPlayer {
        let mut player = SimulatedPlayer::new(100.0);
        player.set_position(position);
        player
    }

    #[test]
    fn test_range_key_format() {
        assert_eq!(range_key((30.0, 40.0)), "30-40");
        assert_eq!(range_key((30.5, 40.25)), "30.5-40.25");
    }

    #[test]
    fn test_detached_scheduler_does_nothing() {
        let mut scheduler = AutoSkipScheduler::new(SchedulerConfig::default());
        let mut player = player_at(35.0);
        assert_eq!(scheduler.tick(0, &mut player, &[AD]), None);
        assert_eq!(player.position(), 35.0);
    }

    #[test]
    fn test_notify_then_skip() {
        let mut scheduler = attached();
        let mut player = player_at(27.0);

        let event = scheduler.tick(0, &mut player, &[AD]);
        assert_eq!(
            event,
            Some(SchedulerEvent::Notified {
                key: "30-40".to_string(),
                range: AD
            })
        );
        assert!(scheduler.notification().is_some());

        // Notified only once per instance
        player.set_position(28.0);
        assert_eq!(scheduler.tick(1000, &mut player, &[AD]), None);

        player.set_position(30.0);
        let event = scheduler.tick(2000, &mut player, &[AD]);
        assert_eq!(
            event,
            Some(SchedulerEvent::Skipped {
                key: "30-40".to_string(),
                range: AD,
                target: 40.1
            })
        );
        assert_eq!(player.position(), 40.1);
    }

    #[test]
    fn test_cancel_before_start_suppresses_skip() {
        let mut scheduler = attached();
        let mut player = player_at(27.0);
        scheduler.tick(0, &mut player, &[AD]);

        player.set_position(29.0);
        assert_eq!(
            scheduler.click_notification(&mut player),
            Some(NotificationAction::Cancel {
                key: "30-40".to_string()
            })
        );
        assert!(scheduler.notification().is_none());

        let mut now = 1000;
        for position in [30.0, 33.0, 36.0, 39.5] {
            player.set_position(position);
            assert_eq!(scheduler.tick(now, &mut player, &[AD]), None);
            now += 1000;
        }
        assert!(player.seeks().is_empty());
    }

    #[test]
    fn test_seek_into_range_skips_without_notification() {
        let mut scheduler = attached();
        let mut player = player_at(35.0);

        assert!(matches!(
            scheduler.tick(0, &mut player, &[AD]),
            Some(SchedulerEvent::Skipped { .. })
        ));
        assert!(!scheduler.is_notified(AD));
        assert!(scheduler.is_skipped(AD));

        // Terminal for this key
        player.set_position(35.0);
        assert_eq!(scheduler.tick(1000, &mut player, &[AD]), None);
    }

    #[test]
    fn test_skip_target_clamped_to_duration() {
        let mut scheduler = attached();
        let mut player = player_at(95.0);
        scheduler.tick(0, &mut player, &[(90.0, 100.0)]);
        assert_eq!(player.position(), 100.0);
    }

    #[test]
    fn test_ticks_throttled_to_poll_interval() {
        let mut scheduler = attached();
        let mut player = player_at(10.0);
        assert_eq!(scheduler.tick(0, &mut player, &[AD]), None);

        player.set_position(35.0);
        assert_eq!(scheduler.tick(999, &mut player, &[AD]), None);
        assert_eq!(player.position(), 35.0);

        assert!(scheduler.tick(1000, &mut player, &[AD]).is_some());
    }

    #[test]
    fn test_one_transition_per_tick_in_start_order() {
        let mut scheduler = attached();
        let mut player = player_at(50.0);
        let ranges = [(50.0, 60.0), (48.0, 55.0)];

        let first = scheduler.tick(0, &mut player, &ranges);
        assert!(matches!(first, Some(SchedulerEvent::Skipped { range: (48.0, 55.0), .. })));
        assert_eq!(player.position(), 55.1);

        let second = scheduler.tick(1000, &mut player, &ranges);
        assert!(matches!(second, Some(SchedulerEvent::Skipped { range: (50.0, 60.0), .. })));
        assert_eq!(player.position(), 60.1);
    }

    #[test]
    fn test_edited_range_is_a_new_instance() {
        let mut scheduler = attached();
        let mut player = player_at(35.0);
        scheduler.tick(0, &mut player, &[AD]);

        player.set_position(35.0);
        let event = scheduler.tick(1000, &mut player, &[(32.0, 40.0)]);
        assert!(matches!(event, Some(SchedulerEvent::Skipped { .. })));
    }

    #[test]
    fn test_jump_back_after_skip() {
        let mut scheduler = attached();
        let mut player = player_at(27.0);
        scheduler.tick(0, &mut player, &[AD]);
        player.set_position(31.0);
        scheduler.tick(1000, &mut player, &[AD]);
        assert_eq!(player.position(), 40.1);

        assert_eq!(
            scheduler.click_notification(&mut player),
            Some(NotificationAction::JumpBack {
                key: "30-40".to_string(),
                target: 29.0
            })
        );
        assert_eq!(player.position(), 29.0);
        assert!(scheduler.is_skipped(AD));

        // Still marked skipped: playing through the range again does not re-fire
        player.set_position(30.5);
        assert_eq!(scheduler.tick(2000, &mut player, &[AD]), None);
    }

    #[test]
    fn test_click_inside_unskipped_range_cancels_current() {
        let mut scheduler = attached();
        let mut player = player_at(28.0);
        scheduler.tick(0, &mut player, &[AD]);

        player.set_position(32.0);
        assert_eq!(
            scheduler.click_notification(&mut player),
            Some(NotificationAction::CancelCurrent {
                key: "30-40".to_string()
            })
        );
        assert_eq!(scheduler.tick(1000, &mut player, &[AD]), None);
        assert_eq!(player.position(), 32.0);
    }

    #[test]
    fn test_notification_auto_dismiss() {
        let mut scheduler = attached();
        let mut player = player_at(28.0);
        scheduler.tick(0, &mut player, &[AD]);

        assert!(!scheduler.expire_notification(4999));
        assert!(scheduler.expire_notification(5000));
        assert_eq!(scheduler.click_notification(&mut player), None);
    }

    #[test]
    fn test_attach_resets_history() {
        let mut scheduler = attached();
        let mut player = player_at(35.0);
        scheduler.tick(0, &mut player, &[AD]);
        assert!(scheduler.is_skipped(AD));

        scheduler.attach();
        assert!(scheduler.is_attached());
        assert!(!scheduler.is_skipped(AD));

        scheduler.detach();
        assert!(!scheduler.is_attached());
        assert!(scheduler.notification().is_none());
    }
}
