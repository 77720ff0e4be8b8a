use serde::{Deserialize, Serialize};

use crate::labels::display_label;

use super::score::calibrate_confidence;

/// Axis-aligned box in model-input pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    /// Clamp both axes to `[0, max]`.
    pub fn clip(self, max: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, max),
            y1: self.y1.clamp(0.0, max),
            x2: self.x2.clamp(0.0, max),
            y2: self.y2.clamp(0.0, max),
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// True when the box has no positive extent on some axis.
    pub fn is_degenerate(&self) -> bool {
        !(self.x1 < self.x2 && self.y1 < self.y2)
    }

    pub fn intersection(&self, other: &BBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    /// Intersection over union, with `eps` added to the denominator.
    pub fn iou(&self, other: &BBox, eps: f32) -> f32 {
        let inter = self.intersection(other);
        inter / (self.area() + other.area() - inter + eps)
    }

    /// Map from a square `img_size` model input onto a `width x height` frame.
    pub fn rescale(&self, img_size: u32, width: u32, height: u32) -> BBox {
        let sx = width as f32 / img_size as f32;
        let sy = height as f32 / img_size as f32;
        BBox::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }
}

/// A single detection handed to the display layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    /// Confidence after the presentation-only calibration bands.
    pub fn display_confidence(&self) -> f32 {
        calibrate_confidence(self.confidence)
    }

    /// Diagnostic group label (`MALIGNANT`, `BENIGN`) or the raw class name.
    pub fn display_label(&self) -> &str {
        display_label(&self.class_name)
    }
}
