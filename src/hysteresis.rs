//! Display smoothing for live video.
//!
//! `HysteresisBuffer` is a presentation policy, not tracking: when a frame yields nothing it
//! keeps showing the last non-empty set for a short window. No box correspondence across
//! frames is attempted and the held set is never re-scored.

use crate::detect::Detection;

/// Hold window applied when not configured otherwise.
pub const DEFAULT_HOLD_MS: u64 = 250;

#[derive(Debug)]
pub struct HysteresisBuffer {
    hold_ms: u64,
    last_detections: Vec<Detection>,
    last_update_ms: u64,
}

impl HysteresisBuffer {
    pub fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            last_detections: Vec::new(),
            last_update_ms: 0,
        }
    }

    pub fn hold_ms(&self) -> u64 {
        self.hold_ms
    }

    /// Detections to display for a frame observed at `now_ms`.
    pub fn update(&mut self, new_detections: Vec<Detection>, now_ms: u64) -> Vec<Detection> {
        if !new_detections.is_empty() {
            self.last_detections = new_detections.clone();
            self.last_update_ms = now_ms;
            return new_detections;
        }
        if !self.last_detections.is_empty()
            && now_ms.saturating_sub(self.last_update_ms) < self.hold_ms
        {
            return self.last_detections.clone();
        }
        self.reset();
        Vec::new()
    }

    /// Forget held detections, e.g. when streaming stops or restarts.
    pub fn reset(&mut self) {
        self.last_detections.clear();
        self.last_update_ms = 0;
    }

    pub fn is_holding(&self) -> bool {
        !self.last_detections.is_empty()
    }
}

impl Default for HysteresisBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BBox;

    fn det() -> Detection {
        Detection {
            class_id: 0,
            class_name: "MEL".into(),
            confidence: 0.9,
            bbox: BBox::new(80.0, 80.0, 120.0, 120.0),
        }
    }

    #[test]
    fn holds_within_window_then_clears() {
        let t = 10_000;
        let mut buf = HysteresisBuffer::default();
        assert_eq!(buf.update(vec![det()], t), vec![det()]);
        assert_eq!(buf.update(Vec::new(), t + 50), vec![det()]);
        assert_eq!(buf.update(Vec::new(), t + 200), vec![det()]);
        assert!(buf.update(Vec::new(), t + 260).is_empty());
        assert!(!buf.is_holding());
    }

    #[test]
    fn window_edge_is_exclusive() {
        let mut buf = HysteresisBuffer::new(250);
        buf.update(vec![det()], 1_000);
        assert!(buf.update(Vec::new(), 1_250).is_empty());
    }

    #[test]
    fn fresh_detections_replace_held_ones() {
        let mut buf = HysteresisBuffer::default();
        buf.update(vec![det()], 0);
        let mut other = det();
        other.class_id = 1;
        assert_eq!(buf.update(vec![other.clone()], 100), vec![other.clone()]);
        assert_eq!(buf.update(Vec::new(), 300), vec![other]);
    }

    #[test]
    fn reset_drops_held_state() {
        let mut buf = HysteresisBuffer::default();
        buf.update(vec![det()], 0);
        buf.reset();
        assert!(buf.update(Vec::new(), 10).is_empty());
    }
}
