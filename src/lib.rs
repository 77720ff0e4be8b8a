//! Dermavision detection core
//!
//! Turns the raw output tensor of a quantized lesion detector into a stable, display-ready
//! detection set under runtime-adjustable sensitivity controls.
//!
//! # Data flow
//!
//! ```text
//! Frame -> Accelerator (external) -> RawTensor -> DetectionPipeline -> HysteresisBuffer -> renderer
//!                                                       ^
//!                                    ThresholdStore ----+---- control plane (get/update/reset)
//! ```
//!
//! # Module Structure
//!
//! - `tensor`: raw tensor shape checks and decoding (objectness / class squashing)
//! - `detect`: scoring, area filter, class-agnostic NMS, accelerator adapters
//! - `thresholds`: versioned, persisted threshold store
//! - `pipeline`: per-frame orchestration against a single threshold snapshot
//! - `hysteresis`: display hold for transient empty frames
//! - `stream`: the per-camera frame loop tying the above together

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod hysteresis;
pub mod labels;
pub mod pipeline;
pub mod stream;
pub mod tensor;
pub mod thresholds;

pub use detect::{
    calibrate_confidence, Accelerator, BBox, Detection, ReplayAccelerator, ScoreFilter,
    Suppressor,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractAccelerator;
pub use error::{DetectError, ValidationError};
pub use frame::Frame;
pub use hysteresis::{HysteresisBuffer, DEFAULT_HOLD_MS};
pub use labels::{display_label, ClassLabels, LesionGroup};
pub use pipeline::{DetectionPipeline, PipelineSettings};
pub use stream::{StreamSession, StreamStats};
pub use tensor::{Activation, RawTensor, TensorDecoder};
pub use thresholds::{
    JsonFileStore, MemoryStore, ThresholdPersistence, ThresholdSnapshot, ThresholdStore,
    ThresholdUpdate, Thresholds,
};

