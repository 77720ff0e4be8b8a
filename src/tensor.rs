//! Raw detector output and its decoding into per-anchor candidates.
//!
//! The accelerator hands back a flat `f32` buffer shaped `(N, 5 + C)`, optionally with a
//! leading batch dimension of 1. Each row is `cx, cy, w, h, objectness, class_0 .. class_C`,
//! boxes already in model-input pixel units.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{DetectError, Result};

/// Box fields plus the objectness column.
pub const BOX_AND_OBJECTNESS: usize = 5;

/// Flat detector output tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensorFile")]
pub struct RawTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct RawTensorFile {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TryFrom<RawTensorFile> for RawTensor {
    type Error = DetectError;

    fn try_from(file: RawTensorFile) -> Result<Self> {
        RawTensor::new(file.shape, file.data)
    }
}

impl RawTensor {
    /// Wrap a buffer, checking that the shape accounts for every element.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
            .ok_or_else(|| DetectError::MalformedTensor(format!("shape {shape:?} overflows")))?;
        if expected != data.len() {
            return Err(DetectError::MalformedTensor(format!(
                "shape {:?} needs {} values, buffer holds {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Build an `(N, cols)` tensor from equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|row| row.len() != cols) {
            return Err(DetectError::MalformedTensor(format!(
                "ragged rows: expected {} columns, found {}",
                cols,
                bad.len()
            )));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(vec![rows.len(), cols], data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// `(rows, cols)` after squeezing a leading batch dimension of 1.
    pub fn matrix_dims(&self) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            [rows, cols] => Ok((*rows, *cols)),
            [1, rows, cols] => Ok((*rows, *cols)),
            other => Err(DetectError::MalformedTensor(format!(
                "expected shape (N, 5+C) or (1, N, 5+C), got {other:?}"
            ))),
        }
    }
}

/// How the objectness and class columns of an exported model are encoded.
///
/// Configured once per model. `Auto` inspects each tensor and may therefore flip between
/// conventions on frames with unusual score distributions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Auto,
    Logits,
    Probabilities,
}

impl FromStr for Activation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "logits" => Ok(Self::Logits),
            "probabilities" | "probs" => Ok(Self::Probabilities),
            other => Err(anyhow::anyhow!(
                "unknown activation '{other}' (expected auto, logits or probabilities)"
            )),
        }
    }
}

/// One anchor after decoding, scores squashed into `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRow {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub objectness: f32,
    pub class_scores: Vec<f32>,
}

/// Splits raw rows into box, objectness and class scores.
#[derive(Clone, Debug)]
pub struct TensorDecoder {
    num_classes: usize,
    activation: Activation,
}

impl TensorDecoder {
    pub fn new(num_classes: usize, activation: Activation) -> Self {
        Self {
            num_classes,
            activation,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Decode every usable row of `tensor`.
    ///
    /// Rows containing NaN or infinity are dropped, as are rows whose scores fall outside
    /// `[0, 1]` when the model is configured to emit probabilities. A non-empty tensor with
    /// no usable row at all is reported as malformed.
    pub fn decode(&self, tensor: &RawTensor) -> Result<Vec<DecodedRow>> {
        let (rows, cols) = tensor.matrix_dims()?;
        let expected_cols = BOX_AND_OBJECTNESS + self.num_classes;
        if self.num_classes == 0 || cols != expected_cols {
            return Err(DetectError::MalformedTensor(format!(
                "expected {} columns for {} classes, got {}",
                expected_cols, self.num_classes, cols
            )));
        }
        if rows == 0 {
            return Ok(Vec::new());
        }

        let usable: Vec<&[f32]> = tensor
            .data()
            .chunks_exact(cols)
            .filter(|row| self.is_usable(row))
            .collect();
        if usable.is_empty() {
            return Err(DetectError::MalformedTensor(format!(
                "none of {rows} rows is usable under {:?} activation",
                self.activation
            )));
        }
        let dropped = rows - usable.len();
        if dropped > 0 {
            log::debug!("dropped {} unusable rows of {}", dropped, rows);
        }

        let squash_obj = self.needs_sigmoid(usable.iter().map(|row| row[4]));
        let squash_cls = self.needs_sigmoid(
            usable
                .iter()
                .flat_map(|row| row[BOX_AND_OBJECTNESS..].iter().copied()),
        );

        Ok(usable
            .into_iter()
            .map(|row| {
                let objectness = if squash_obj { sigmoid(row[4]) } else { row[4] };
                let class_scores = row[BOX_AND_OBJECTNESS..]
                    .iter()
                    .map(|&v| if squash_cls { sigmoid(v) } else { v })
                    .collect();
                DecodedRow {
                    cx: row[0],
                    cy: row[1],
                    w: row[2],
                    h: row[3],
                    objectness,
                    class_scores,
                }
            })
            .collect())
    }

    fn is_usable(&self, row: &[f32]) -> bool {
        if !row.iter().all(|v| v.is_finite()) {
            return false;
        }
        match self.activation {
            Activation::Probabilities => row[4..].iter().all(|v| (0.0..=1.0).contains(v)),
            Activation::Auto | Activation::Logits => true,
        }
    }

    fn needs_sigmoid(&self, values: impl Iterator<Item = f32>) -> bool {
        match self.activation {
            Activation::Logits => true,
            Activation::Probabilities => false,
            Activation::Auto => {
                let (min, max) = values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
                min < 0.0 || max > 1.0
            }
        }
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
