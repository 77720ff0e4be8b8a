//! Frame loop glue: accelerator, pipeline and hysteresis, strictly in frame order.

use crate::detect::{Accelerator, Detection};
use crate::frame::Frame;
use crate::hysteresis::HysteresisBuffer;
use crate::pipeline::DetectionPipeline;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames: u64,
    /// Frames where the pipeline itself produced detections.
    pub frames_detected: u64,
    /// Frames where an empty result was covered by the hold window.
    pub frames_held: u64,
    pub inference_failures: u64,
}

/// One streaming session over a single camera.
pub struct StreamSession {
    accelerator: Box<dyn Accelerator>,
    pipeline: DetectionPipeline,
    hysteresis: HysteresisBuffer,
    img_size: u32,
    predictions_enabled: bool,
    stats: StreamStats,
}

impl StreamSession {
    pub fn new(
        accelerator: Box<dyn Accelerator>,
        pipeline: DetectionPipeline,
        img_size: u32,
        hold_ms: u64,
    ) -> Self {
        Self {
            accelerator,
            pipeline,
            hysteresis: HysteresisBuffer::new(hold_ms),
            img_size,
            predictions_enabled: true,
            stats: StreamStats::default(),
        }
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn accelerator_name(&self) -> &'static str {
        self.accelerator.name()
    }

    pub fn predictions_enabled(&self) -> bool {
        self.predictions_enabled
    }

    /// Switch inference on or off for subsequent frames.
    ///
    /// While off, frames pass through without touching the accelerator or the hold window.
    pub fn set_predictions_enabled(&mut self, enabled: bool) {
        if enabled != self.predictions_enabled {
            log::info!("predictions {}", if enabled { "enabled" } else { "disabled" });
        }
        self.predictions_enabled = enabled;
    }

    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.accelerator.warm_up()
    }

    /// Detections to display for `frame`, observed at `now_ms`.
    ///
    /// A failed inference counts as an empty frame, so the hold window still applies. With
    /// predictions disabled the frame is counted and nothing is shown.
    pub fn next(&mut self, frame: &Frame, now_ms: u64) -> Vec<Detection> {
        self.stats.frames += 1;
        if !self.predictions_enabled {
            return Vec::new();
        }
        let detections = match self.accelerator.infer(frame) {
            Ok(tensor) => self.pipeline.process(&tensor, self.img_size),
            Err(e) => {
                self.stats.inference_failures += 1;
                log::error!("{} inference failed: {:#}", self.accelerator.name(), e);
                Vec::new()
            }
        };
        let detected = !detections.is_empty();
        let shown = self.hysteresis.update(detections, now_ms);
        if detected {
            self.stats.frames_detected += 1;
        } else if !shown.is_empty() {
            self.stats.frames_held += 1;
        }
        shown
    }

    /// Stop streaming: held detections are dropped.
    pub fn stop(&mut self) {
        self.hysteresis.reset();
        log::info!(
            "stream stopped after {} frames ({} detected, {} held, {} failed)",
            self.stats.frames,
            self.stats.frames_detected,
            self.stats.frames_held,
            self.stats.inference_failures
        );
    }

    /// Start a fresh session on the same accelerator and pipeline.
    pub fn restart(&mut self) {
        self.hysteresis.reset();
        self.stats = StreamStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ReplayAccelerator;
    use crate::labels::ClassLabels;
    use crate::pipeline::PipelineSettings;
    use crate::tensor::RawTensor;
    use crate::thresholds::ThresholdStore;
    use anyhow::anyhow;
    use std::sync::Arc;

    struct FailingAccelerator;

    impl Accelerator for FailingAccelerator {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn infer(&mut self, _frame: &Frame) -> anyhow::Result<RawTensor> {
            Err(anyhow!("npu timeout"))
        }
    }

    fn pipeline() -> DetectionPipeline {
        DetectionPipeline::new(
            Arc::new(ThresholdStore::in_memory()),
            Arc::new(ClassLabels::new(vec!["MEL".into()]).unwrap()),
            PipelineSettings::default(),
        )
    }

    fn hit() -> RawTensor {
        RawTensor::from_rows(&[vec![100.0, 100.0, 40.0, 40.0, 0.95, 0.95]]).unwrap()
    }

    fn miss() -> RawTensor {
        RawTensor::new(vec![0, 6], Vec::new()).unwrap()
    }

    #[test]
    fn empty_frames_are_held_then_dropped() {
        let replay = ReplayAccelerator::new(vec![hit(), miss(), miss()]).unwrap();
        let mut session = StreamSession::new(Box::new(replay), pipeline(), 640, 250);
        let frame = Frame::blank(8, 8).unwrap();

        assert_eq!(session.next(&frame, 0).len(), 1);
        assert_eq!(session.next(&frame, 100).len(), 1);
        assert!(session.next(&frame, 400).is_empty());

        let stats = session.stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.frames_detected, 1);
        assert_eq!(stats.frames_held, 1);
    }

    #[test]
    fn restart_clears_held_detections() {
        let replay = ReplayAccelerator::new(vec![hit(), miss()]).unwrap();
        let mut session = StreamSession::new(Box::new(replay), pipeline(), 640, 250);
        let frame = Frame::blank(8, 8).unwrap();
        session.next(&frame, 0);
        session.restart();
        assert!(session.next(&frame, 10).is_empty());
        assert_eq!(session.stats().frames, 1);
    }

    #[test]
    fn disabled_predictions_skip_inference_and_keep_the_hold() {
        let replay = ReplayAccelerator::new(vec![hit(), miss()]).unwrap();
        let mut session = StreamSession::new(Box::new(replay), pipeline(), 640, 250);
        let frame = Frame::blank(8, 8).unwrap();
        let first = session.next(&frame, 0);
        assert_eq!(first.len(), 1);

        session.set_predictions_enabled(false);
        assert!(!session.predictions_enabled());
        assert!(session.next(&frame, 50).is_empty());
        assert!(session.next(&frame, 60).is_empty());

        // The replay was not advanced, so the next tensor is still `miss`; the hold from
        // t=0 still covers it.
        session.set_predictions_enabled(true);
        assert_eq!(session.next(&frame, 100), first);

        let stats = session.stats();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.frames_detected, 1);
        assert_eq!(stats.frames_held, 1);
    }

    #[test]
    fn disabled_session_never_calls_the_accelerator() {
        let mut session = StreamSession::new(Box::new(FailingAccelerator), pipeline(), 640, 250);
        session.set_predictions_enabled(false);
        assert!(session.next(&Frame::blank(8, 8).unwrap(), 0).is_empty());
        assert_eq!(session.stats().inference_failures, 0);
        assert_eq!(session.stats().frames, 1);
    }

    #[test]
    fn inference_failure_is_an_empty_frame() {
        let mut session = StreamSession::new(Box::new(FailingAccelerator), pipeline(), 640, 250);
        assert!(session.next(&Frame::blank(8, 8).unwrap(), 0).is_empty());
        assert_eq!(session.stats().inference_failures, 1);
    }
}
