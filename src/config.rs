use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::Suppressor;
use crate::hysteresis::DEFAULT_HOLD_MS;
use crate::pipeline::PipelineSettings;
use crate::tensor::Activation;

const DEFAULT_IMG_SIZE: u32 = 640;
const DEFAULT_LABELS_PATH: &str = "config/labels.toml";
const DEFAULT_THRESHOLDS_PATH: &str = "thresholds.json";

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    img_size: Option<u32>,
    labels_path: Option<PathBuf>,
    thresholds_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    activation: Option<Activation>,
    nms: Option<NmsConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct NmsConfigFile {
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    hold_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Square model input side in pixels.
    pub img_size: u32,
    pub labels_path: PathBuf,
    pub thresholds_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub activation: Activation,
    pub nms_top_k: usize,
    pub hold_ms: u64,
}

impl DetectorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DERMAVISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectorConfigFile) -> Self {
        Self {
            img_size: file.img_size.unwrap_or(DEFAULT_IMG_SIZE),
            labels_path: file
                .labels_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
            thresholds_path: file
                .thresholds_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_THRESHOLDS_PATH)),
            model_path: file.model_path,
            activation: file.activation.unwrap_or_default(),
            nms_top_k: file
                .nms
                .and_then(|nms| nms.top_k)
                .unwrap_or(Suppressor::DEFAULT_TOP_K),
            hold_ms: file
                .stream
                .and_then(|stream| stream.hold_ms)
                .unwrap_or(DEFAULT_HOLD_MS),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(size) = std::env::var("DERMAVISION_IMG_SIZE") {
            self.img_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("DERMAVISION_IMG_SIZE must be a positive integer"))?;
        }
        if let Ok(path) = std::env::var("DERMAVISION_LABELS") {
            if !path.trim().is_empty() {
                self.labels_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("DERMAVISION_THRESHOLDS") {
            if !path.trim().is_empty() {
                self.thresholds_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("DERMAVISION_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(mode) = std::env::var("DERMAVISION_ACTIVATION") {
            self.activation = mode.parse()?;
        }
        if let Ok(top_k) = std::env::var("DERMAVISION_TOP_K") {
            self.nms_top_k = top_k
                .trim()
                .parse()
                .map_err(|_| anyhow!("DERMAVISION_TOP_K must be a positive integer"))?;
        }
        if let Ok(hold) = std::env::var("DERMAVISION_HOLD_MS") {
            self.hold_ms = hold
                .trim()
                .parse()
                .map_err(|_| anyhow!("DERMAVISION_HOLD_MS must be an integer number of ms"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.img_size == 0 {
            return Err(anyhow!("img_size must be greater than zero"));
        }
        if self.nms_top_k == 0 {
            return Err(anyhow!("nms top_k must be greater than zero"));
        }
        if self.hold_ms == 0 {
            return Err(anyhow!("hold_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            activation: self.activation,
            nms_top_k: self.nms_top_k,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
