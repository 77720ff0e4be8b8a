//! Confidence scoring and the confidence / minimum-area cutoffs.

use crate::tensor::DecodedRow;
use crate::thresholds::Thresholds;

use super::result::BBox;

/// A scored box that survived filtering, awaiting suppression.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
    /// Position in the decoded row list; breaks confidence ties.
    pub order: usize,
}

/// Applies `conf_th` and `min_box_frac` to decoded rows.
#[derive(Clone, Debug)]
pub struct ScoreFilter {
    img_size: u32,
}

impl ScoreFilter {
    pub fn new(img_size: u32) -> Self {
        Self { img_size }
    }

    pub fn img_size(&self) -> u32 {
        self.img_size
    }

    /// Smallest box area in pixels kept for `min_box_frac`.
    pub fn min_area(&self, min_box_frac: f32) -> f32 {
        let side = self.img_size as f32;
        side * side * min_box_frac
    }

    pub fn apply(&self, rows: &[DecodedRow], thresholds: &Thresholds) -> Vec<Candidate> {
        let min_area = self.min_area(thresholds.min_box_frac);
        let max_coord = self.img_size.saturating_sub(1) as f32;

        rows.iter()
            .enumerate()
            .filter_map(|(order, row)| {
                let (class_id, class_score) = argmax(&row.class_scores)?;
                let confidence = row.objectness * class_score;
                if confidence < thresholds.conf_th {
                    return None;
                }
                if row.w * row.h < min_area {
                    return None;
                }
                let bbox = BBox::from_center(row.cx, row.cy, row.w, row.h).clip(max_coord);
                if bbox.is_degenerate() {
                    return None;
                }
                Some(Candidate {
                    bbox,
                    confidence,
                    class_id,
                    order,
                })
            })
            .collect()
    }
}

/// Index and value of the largest score; the lowest index wins ties.
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, score)| match best {
            Some((_, top)) if score <= top => best,
            _ => Some((idx, score)),
        })
}

/// Presentation-only confidence uplift for low but plausible detections.
///
/// Never feeds back into filtering or suppression.
pub fn calibrate_confidence(confidence: f32) -> f32 {
    let lifted = if confidence < 0.3 {
        confidence + 0.3
    } else if confidence < 0.4 {
        confidence + 0.2
    } else if confidence < 0.5 {
        confidence + 0.1
    } else {
        confidence
    };
    lifted.min(1.0)
}
