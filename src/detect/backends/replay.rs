use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::detect::backend::Accelerator;
use crate::frame::Frame;
use crate::tensor::RawTensor;

/// Replays recorded detector outputs in order, cycling at the end.
///
/// Stands in for the NPU when running the stream loop off-device and in tests.
pub struct ReplayAccelerator {
    tensors: Vec<RawTensor>,
    cursor: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Many(Vec<RawTensor>),
    One(RawTensor),
}

impl ReplayAccelerator {
    pub fn new(tensors: Vec<RawTensor>) -> Result<Self> {
        if tensors.is_empty() {
            return Err(anyhow!("replay needs at least one tensor"));
        }
        Ok(Self { tensors, cursor: 0 })
    }

    /// Load a JSON file holding one tensor or an array of tensors.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let parsed: ReplayFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid replay file {}", path.display()))?;
        let tensors = match parsed {
            ReplayFile::Many(tensors) => tensors,
            ReplayFile::One(tensor) => vec![tensor],
        };
        Self::new(tensors)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl Accelerator for ReplayAccelerator {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<RawTensor> {
        let tensor = self.tensors[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.tensors.len();
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replays_in_order_and_cycles() {
        let a = RawTensor::new(vec![0, 6], Vec::new()).unwrap();
        let b = RawTensor::new(vec![1, 6], vec![0.0; 6]).unwrap();
        let mut replay = ReplayAccelerator::new(vec![a.clone(), b.clone()]).unwrap();
        let frame = Frame::blank(4, 4).unwrap();
        assert_eq!(replay.infer(&frame).unwrap(), a);
        assert_eq!(replay.infer(&frame).unwrap(), b);
        assert_eq!(replay.infer(&frame).unwrap(), a);
    }

    #[test]
    fn loads_single_or_many_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"shape":[1,6],"data":[1,2,3,4,5,6]}"#).unwrap();
        assert_eq!(ReplayAccelerator::from_file(file.path()).unwrap().len(), 1);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"shape":[0,6],"data":[]},{"shape":[1,6],"data":[1,2,3,4,5,6]}]"#)
            .unwrap();
        assert_eq!(ReplayAccelerator::from_file(file.path()).unwrap().len(), 2);
    }

    #[test]
    fn empty_replay_is_rejected() {
        assert!(ReplayAccelerator::new(Vec::new()).is_err());
    }
}
