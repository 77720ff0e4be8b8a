//! Class label table, index-aligned with the detector's class columns.
//!
//! Loaded once at startup and shared read-only across frames.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

const MALIGNANT_CLASSES: [&str; 4] = ["AKIEC", "BCC", "SCC", "MEL"];
const BENIGN_CLASSES: [&str; 4] = ["BKL", "DF", "NV", "VASC"];

#[derive(Debug, Deserialize)]
struct LabelsFile {
    names: Vec<String>,
}

/// Ordered class names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("class label table is empty"));
        }
        if let Some(idx) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(anyhow!("class label {} is blank", idx));
        }
        Ok(Self { names })
    }

    /// Read a TOML file of the form `names = ["AKIEC", "BCC", ...]`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label file {}", path.display()))?;
        let file: LabelsFile = toml::from_str(&raw)
            .with_context(|| format!("invalid label file {}", path.display()))?;
        Self::new(file.names)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Clinical grouping shown next to a detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LesionGroup {
    Malignant,
    Benign,
    Other,
}

impl LesionGroup {
    pub fn of(class_name: &str) -> Self {
        if MALIGNANT_CLASSES.contains(&class_name) {
            Self::Malignant
        } else if BENIGN_CLASSES.contains(&class_name) {
            Self::Benign
        } else {
            Self::Other
        }
    }
}

/// `MALIGNANT` / `BENIGN` for known lesion classes, the class name otherwise.
pub fn display_label(class_name: &str) -> &str {
    match LesionGroup::of(class_name) {
        LesionGroup::Malignant => "MALIGNANT",
        LesionGroup::Benign => "BENIGN",
        LesionGroup::Other => class_name,
    }
}
