use thiserror::Error;

/// A threshold update carried a value outside its domain.
///
/// The whole update is rejected; nothing is applied.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{field} = {value} is out of range, expected {range}")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: f32,
    pub range: &'static str,
}

/// Errors produced by the detection core.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("malformed detector output: {0}")]
    MalformedTensor(String),

    #[error("threshold storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
