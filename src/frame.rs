//! Camera frames handed to the accelerator.
//!
//! A `Frame` is an interleaved RGB8 buffer at camera resolution. The core never inspects
//! pixels itself; adapters resize to the model input and renderers rescale boxes back.

use anyhow::{anyhow, Result};

/// Interleaved RGB8 frame.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Black frame, used by replay sources that ignore pixels.
    pub fn blank(width: u32, height: u32) -> Result<Self> {
        let len = rgb_len(width, height)?;
        Ok(Self {
            data: vec![0; len],
            width,
            height,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}
