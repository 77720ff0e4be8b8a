//! Per-frame post-processing: decode, score, suppress, label.
//!
//! One `ThresholdSnapshot` is taken when a frame enters `process` and used for every stage,
//! so a concurrent threshold change lands on the next frame in full.

use std::sync::Arc;

use crate::detect::{Detection, ScoreFilter, Suppressor};
use crate::error::Result;
use crate::labels::ClassLabels;
use crate::tensor::{Activation, RawTensor, TensorDecoder};
use crate::thresholds::{ThresholdSnapshot, ThresholdStore};

/// Fixed per-model settings.
#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub activation: Activation,
    pub nms_top_k: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            activation: Activation::Auto,
            nms_top_k: Suppressor::DEFAULT_TOP_K,
        }
    }
}

pub struct DetectionPipeline {
    store: Arc<ThresholdStore>,
    labels: Arc<ClassLabels>,
    decoder: TensorDecoder,
    suppressor: Suppressor,
}

impl DetectionPipeline {
    pub fn new(
        store: Arc<ThresholdStore>,
        labels: Arc<ClassLabels>,
        settings: PipelineSettings,
    ) -> Self {
        let decoder = TensorDecoder::new(labels.len(), settings.activation);
        Self {
            store,
            labels,
            decoder,
            suppressor: Suppressor::new(settings.nms_top_k),
        }
    }

    pub fn store(&self) -> &Arc<ThresholdStore> {
        &self.store
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    /// Detections for one frame. Malformed output skips the frame with a warning.
    pub fn process(&self, tensor: &RawTensor, img_size: u32) -> Vec<Detection> {
        match self.try_process(tensor, img_size) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("skipping frame, tensor shape {:?}: {}", tensor.shape(), e);
                Vec::new()
            }
        }
    }

    /// Like `process`, but reports malformed tensors instead of absorbing them.
    pub fn try_process(&self, tensor: &RawTensor, img_size: u32) -> Result<Vec<Detection>> {
        let snapshot = self.store.get();
        self.process_with(tensor, img_size, &snapshot)
    }

    /// Run every stage against an explicit snapshot.
    pub fn process_with(
        &self,
        tensor: &RawTensor,
        img_size: u32,
        snapshot: &ThresholdSnapshot,
    ) -> Result<Vec<Detection>> {
        let thresholds = &snapshot.thresholds;

        let rows = self.decoder.decode(tensor)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = ScoreFilter::new(img_size).apply(&rows, thresholds);
        let scored = candidates.len();
        if candidates.is_empty() {
            log::debug!("v{}: {} rows, none passed filters", snapshot.version, rows.len());
            return Ok(Vec::new());
        }

        let kept = self.suppressor.suppress(candidates, thresholds.iou_th);
        log::debug!(
            "v{}: {} rows -> {} scored -> {} kept",
            snapshot.version,
            rows.len(),
            scored,
            kept.len()
        );

        Ok(kept
            .into_iter()
            .map(|cand| Detection {
                class_id: cand.class_id,
                class_name: self
                    .labels
                    .name(cand.class_id)
                    .unwrap_or("unknown")
                    .to_string(),
                confidence: cand.confidence,
                bbox: cand.bbox,
            })
            .collect())
    }
}
