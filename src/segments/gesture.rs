/// Pointer gesture handling for segment markers
///
/// Translates pointer-down / move / up into `SegmentModel` edits. A gesture only
/// becomes a drag once the pointer travels more than [`DRAG_THRESHOLD_PX`];
/// releasing before that toggles the segment instead.
use super::SegmentModel;
use crate::player::format_timestamp;
use tracing::{debug, info};

/// Pointer travel, in pixels, before a press counts as a drag
pub const DRAG_THRESHOLD_PX: f64 = 2.0;

/// Part of a marker the pointer went down on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    /// Marker body, moves the whole segment
    Body,
    /// Left edge, resizes the start
    Left,
    /// Right edge, resizes the end
    Right,
}

/// What a completed gesture did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureOutcome {
    Toggled { segment_id: String, active: bool },
    Adjusted { segment_id: String },
    /// Release without a matching press
    Ignored,
}

#[derive(Debug, Clone)]
struct PressState {
    segment_id: String,
    handle: Handle,
    origin_x: f64,
    initial_start: f64,
    initial_end: f64,
    dragging: bool,
}

/// Tracks at most one gesture at a time
#[derive(Debug, Clone, Default)]
pub struct GestureTracker {
    press: Option<PressState>,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.press.is_some()
    }

    pub fn is_dragging(&self) -> bool {
        self.press.as_ref().is_some_and(|press| press.dragging)
    }

    /// Start a gesture; returns false if the segment does not exist
    pub fn pointer_down(&mut self, model: &SegmentModel, segment_id: &str, handle: Handle, x: f64) -> bool {
        let Some(segment) = model.get(segment_id) else {
            self.press = None;
            return false;
        };

        self.press = Some(PressState {
            segment_id: segment_id.to_string(),
            handle,
            origin_x: x,
            initial_start: segment.start,
            initial_end: segment.end,
            dragging: false,
        });
        true
    }

    /// Apply pointer movement. `layer_width` is the marker layer width in pixels.
    pub fn pointer_move(&mut self, model: &mut SegmentModel, x: f64, layer_width: f64) {
        let Some(press) = self.press.as_mut() else {
            return;
        };

        let delta_x = x - press.origin_x;
        if delta_x.abs() > DRAG_THRESHOLD_PX {
            press.dragging = true;
        }
        if !press.dragging || layer_width <= 0.0 {
            return;
        }

        let delta_seconds = delta_x * model.duration() / layer_width;
        let id = press.segment_id.as_str();

        match press.handle {
            Handle::Body => {
                model.place(id, press.initial_start, press.initial_end);
                model.move_segment(id, delta_seconds);
            }
            Handle::Left => {
                model.resize_start(id, press.initial_start + delta_seconds);
            }
            Handle::Right => {
                model.resize_end(id, press.initial_end + delta_seconds);
            }
        }
    }

    /// Finish the gesture: a press that never became a drag toggles the segment
    pub fn pointer_up(&mut self, model: &mut SegmentModel) -> GestureOutcome {
        let Some(press) = self.press.take() else {
            return GestureOutcome::Ignored;
        };

        if !press.dragging {
            model.toggle_active(&press.segment_id);
            let active = model.get(&press.segment_id).is_some_and(|segment| segment.active);
            debug!("Segment {} toggled, active: {}", press.segment_id, active);
            return GestureOutcome::Toggled {
                segment_id: press.segment_id,
                active,
            };
        }

        if let Some(segment) = model.get(&press.segment_id) {
            info!(
                "✂️ Adjusted ad segment: {} - {}",
                format_timestamp(segment.start),
                format_timestamp(segment.end)
            );
        }
        GestureOutcome::Adjusted {
            segment_id: press.segment_id,
        }
    }

    /// Abandon the current gesture without toggling
    pub fn cancel(&mut self) {
        self.press = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "ad-seg-1-0";

    // 1000 px layer over a 100 s video: 10 px per second
    fn model() -> SegmentModel {
        SegmentModel::from_ranges(&[(30.0, 40.0)], 100.0, 1)
    }

    #[test]
    fn test_click_toggles() {
        let mut model = model();
        let mut tracker = GestureTracker::new();

        assert!(tracker.pointer_down(&model, ID, Handle::Body, 300.0));
        let outcome = tracker.pointer_up(&mut model);

        assert_eq!(
            outcome,
            GestureOutcome::Toggled {
                segment_id: ID.to_string(),
                active: false
            }
        );
        assert!(model.effective_ranges().is_empty());
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_small_jitter_never_edits() {
        let mut model = model();
        let mut tracker = GestureTracker::new();

        tracker.pointer_down(&model, ID, Handle::Right, 400.0);
        tracker.pointer_move(&mut model, 402.0, 1000.0);
        tracker.pointer_move(&mut model, 398.5, 1000.0);
        assert!(!tracker.is_dragging());
        assert_eq!(model.get(ID).unwrap().range(), (30.0, 40.0));

        assert!(matches!(tracker.pointer_up(&mut model), GestureOutcome::Toggled { .. }));
        assert_eq!(model.get(ID).unwrap().range(), (30.0, 40.0));
    }

    #[test]
    fn test_body_drag_is_relative_to_press() {
        let mut model = model();
        let mut tracker = GestureTracker::new();

        tracker.pointer_down(&model, ID, Handle::Body, 300.0);
        tracker.pointer_move(&mut model, 350.0, 1000.0);
        assert_eq!(model.get(ID).unwrap().range(), (35.0, 45.0));

        // Moving back toward the origin undoes the shift instead of compounding it
        tracker.pointer_move(&mut model, 320.0, 1000.0);
        assert_eq!(model.get(ID).unwrap().range(), (32.0, 42.0));

        // Returning under the threshold after dragging still counts as a drag
        tracker.pointer_move(&mut model, 301.0, 1000.0);
        assert_eq!(
            tracker.pointer_up(&mut model),
            GestureOutcome::Adjusted {
                segment_id: ID.to_string()
            }
        );
        assert!(model.get(ID).unwrap().active);
    }

    #[test]
    fn test_handle_drags_resize() {
        let mut model = model();
        let mut tracker = GestureTracker::new();

        tracker.pointer_down(&model, ID, Handle::Left, 300.0);
        tracker.pointer_move(&mut model, 200.0, 1000.0);
        tracker.pointer_up(&mut model);
        assert_eq!(model.get(ID).unwrap().range(), (20.0, 40.0));

        tracker.pointer_down(&model, ID, Handle::Right, 400.0);
        tracker.pointer_move(&mut model, 100.0, 1000.0);
        tracker.pointer_up(&mut model);
        assert_eq!(model.get(ID).unwrap().range(), (20.0, 20.5));
    }

    #[test]
    fn test_unknown_segment_and_stray_release() {
        let mut model = model();
        let mut tracker = GestureTracker::new();

        assert!(!tracker.pointer_down(&model, "missing", Handle::Body, 0.0));
        assert_eq!(tracker.pointer_up(&mut model), GestureOutcome::Ignored);

        tracker.pointer_down(&model, ID, Handle::Body, 0.0);
        tracker.cancel();
        assert_eq!(tracker.pointer_up(&mut model), GestureOutcome::Ignored);
        assert!(model.get(ID).unwrap().active);
    }
}
