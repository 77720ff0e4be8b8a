mod backend;
mod backends;
mod nms;
mod result;
mod score;

pub use backend::Accelerator;
pub use backends::ReplayAccelerator;
#[cfg(feature = "backend-tract")]
pub use backends::TractAccelerator;
pub use nms::{Suppressor, IOU_EPSILON};
pub use result::{BBox, Detection};
pub use score::{calibrate_confidence, Candidate, ScoreFilter};
