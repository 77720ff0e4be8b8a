pub mod replay;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use replay::ReplayAccelerator;

#[cfg(feature = "backend-tract")]
pub use tract::TractAccelerator;
