#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::Accelerator;
use crate::frame::Frame;
use crate::tensor::RawTensor;

/// Tract-based adapter for an ONNX export of the lesion detector.
///
/// Frames are stretched to the square model input (triangle filter, no letterbox) and fed as
/// NCHW `f32` in `[0, 1]`. The first model output is returned untouched as the raw tensor.
pub struct TractAccelerator {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    img_size: u32,
}

impl TractAccelerator {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, img_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = img_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, img_size })
    }
}

impl Accelerator for TractAccelerator {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame) -> Result<RawTensor> {
        let input = nchw_input(frame, self.img_size)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let data = view.iter().copied().collect();
        Ok(RawTensor::new(shape, data)?)
    }

    fn warm_up(&mut self) -> Result<()> {
        let frame = Frame::blank(self.img_size, self.img_size)?;
        self.infer(&frame).map(|_| ())
    }
}

/// Stretch `frame` to `side x side` and lay it out as a `1x3xHxW` tensor in `[0, 1]`.
fn nchw_input(frame: &Frame, side: u32) -> Result<Tensor> {
    let rgb = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| {
            anyhow!(
                "frame buffer does not hold {}x{} RGB pixels",
                frame.width,
                frame.height
            )
        })?;
    let resized = if rgb.dimensions() == (side, side) {
        rgb
    } else {
        imageops::resize(&rgb, side, side, FilterType::Triangle)
    };
    let n = side as usize;
    let input = tract_ndarray::Array4::from_shape_fn((1, 3, n, n), |(_, c, y, x)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });
    Ok(input.into_tensor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_resized_to_model_side_in_nchw() {
        let red = [255u8, 0, 0].repeat(8 * 4);
        let frame = Frame::new(red, 8, 4).unwrap();
        let input = nchw_input(&frame, 6).unwrap();
        assert_eq!(input.shape(), &[1, 3, 6, 6]);

        let view = input.to_array_view::<f32>().unwrap();
        for y in 0..6 {
            for x in 0..6 {
                assert!((view[[0, 0, y, x]] - 1.0).abs() < 1e-6);
                assert_eq!(view[[0, 2, y, x]], 0.0);
            }
        }
    }

    #[test]
    fn matching_frame_passes_through_unscaled() {
        let pixels: Vec<u8> = (0..2 * 2 * 3).map(|v| v as u8 * 10).collect();
        let frame = Frame::new(pixels, 2, 2).unwrap();
        let input = nchw_input(&frame, 2).unwrap();
        let view = input.to_array_view::<f32>().unwrap();
        // pixel (x=1, y=0), green channel is byte 4
        assert!((view[[0, 1, 0, 1]] - 40.0 / 255.0).abs() < 1e-6);
    }
}
