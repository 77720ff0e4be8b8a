//! Class-agnostic greedy non-maximum suppression.
//!
//! Overlapping boxes of related lesion classes are visual duplicates, so a confident box of
//! any class suppresses overlapping boxes of every class.

use super::score::Candidate;

/// Guards the IoU denominator against near-zero-area boxes.
pub const IOU_EPSILON: f32 = 1e-9;

/// Greedy NMS with a top-K cap applied before suppression.
#[derive(Clone, Debug)]
pub struct Suppressor {
    top_k: usize,
}

impl Suppressor {
    /// Candidates kept before suppression when not configured otherwise.
    pub const DEFAULT_TOP_K: usize = 300;

    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Keep the most confident box of each overlapping cluster.
    ///
    /// A box is removed when its IoU with an already kept box is strictly greater than
    /// `iou_th`. Equal confidences are ordered by `Candidate::order`.
    pub fn suppress(&self, mut candidates: Vec<Candidate>, iou_th: f32) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.order.cmp(&b.order))
        });
        if candidates.len() > self.top_k {
            log::trace!(
                "capping {} candidates to top {}",
                candidates.len(),
                self.top_k
            );
            candidates.truncate(self.top_k);
        }

        let mut suppressed = vec![false; candidates.len()];
        let mut kept = Vec::new();
        for i in 0..candidates.len() {
            if suppressed[i] {
                continue;
            }
            let seed = candidates[i].bbox;
            for j in (i + 1)..candidates.len() {
                if !suppressed[j] && seed.iou(&candidates[j].bbox, IOU_EPSILON) > iou_th {
                    suppressed[j] = true;
                }
            }
            kept.push(i);
        }

        let mut kept = kept.into_iter().peekable();
        candidates
            .into_iter()
            .enumerate()
            .filter_map(|(idx, cand)| {
                if kept.peek() == Some(&idx) {
                    kept.next();
                    Some(cand)
                } else {
                    None
                }
            })
            .collect()
    }
}

impl Default for Suppressor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOP_K)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BBox;

    fn cand(order: usize, confidence: f32, class_id: usize, x: f32) -> Candidate {
        Candidate {
            bbox: BBox::new(x, 0.0, x + 40.0, 40.0),
            confidence,
            class_id,
            order,
        }
    }

    #[test]
    fn overlapping_boxes_of_different_classes_collapse() {
        let kept = Suppressor::default().suppress(
            vec![cand(0, 0.7, 0, 2.0), cand(1, 0.9, 1, 0.0), cand(2, 0.8, 0, 200.0)],
            0.3,
        );
        let orders: Vec<usize> = kept.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn ties_keep_the_earlier_candidate() {
        let kept =
            Suppressor::default().suppress(vec![cand(0, 0.8, 1, 1.0), cand(1, 0.8, 0, 0.0)], 0.3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].order, 0);
    }

    #[test]
    fn iou_equal_to_threshold_survives() {
        // Same height, offset by 20 of 40: inter 800, union 2400 -> IoU 1/3.
        let a = cand(0, 0.9, 0, 0.0);
        let b = cand(1, 0.8, 0, 20.0);
        let iou = a.bbox.iou(&b.bbox, IOU_EPSILON);
        let kept = Suppressor::default().suppress(vec![a, b], iou);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn top_k_cap_keeps_most_confident() {
        let candidates = (0..10)
            .map(|i| cand(i, 0.1 * (i as f32 + 1.0) / 2.0, 0, i as f32 * 100.0))
            .collect();
        let kept = Suppressor::new(3).suppress(candidates, 0.3);
        let orders: Vec<usize> = kept.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![9, 8, 7]);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let candidates: Vec<Candidate> = (0..30)
            .map(|i| cand(i, 1.0 - i as f32 * 0.01, i % 3, (i * 7) as f32))
            .collect();
        let nms = Suppressor::default();
        let once = nms.suppress(candidates, 0.3);
        let twice = nms.suppress(once.clone(), 0.3);
        assert_eq!(once, twice);
    }
}
