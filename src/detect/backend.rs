use anyhow::Result;

use crate::frame::Frame;
use crate::tensor::RawTensor;

/// Inference accelerator adapter.
///
/// # Contract
///
/// Implementations return the detector's raw output as `(N, 5 + C)`, optionally with a
/// leading batch dimension of 1. Anything else is rejected by the pipeline as malformed
/// and the frame yields no detections. Timeouts and device failures are the adapter's
/// concern; an `Err` from `infer` is treated by the stream loop as an empty frame.
pub trait Accelerator: Send {
    /// Adapter identifier.
    fn name(&self) -> &'static str;

    /// Run one blocking inference call on a frame.
    fn infer(&mut self, frame: &Frame) -> Result<RawTensor>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
