//! Runtime-adjustable detection thresholds.
//!
//! `ThresholdStore` is the only shared mutable state between the frame loop and the control
//! plane. Every read and write goes through one mutex and copies the whole record, so a
//! reader sees either the old or the new triple, never a mix. Persistence runs after the
//! state lock is released, from the copy taken under it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{DetectError, Result, ValidationError};

pub const DEFAULT_CONF_TH: f32 = 0.60;
pub const DEFAULT_IOU_TH: f32 = 0.30;
pub const DEFAULT_MIN_BOX_FRAC: f32 = 0.003;

const UNIT_RANGE: &str = "[0, 1]";
const BOX_FRAC_RANGE: &str = "(0, 0.5]";

/// The three sensitivity knobs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum `objectness * class_score` kept.
    pub conf_th: f32,
    /// IoU above which the less confident box is suppressed.
    pub iou_th: f32,
    /// Minimum box area as a fraction of `img_size^2`.
    pub min_box_frac: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            conf_th: DEFAULT_CONF_TH,
            iou_th: DEFAULT_IOU_TH,
            min_box_frac: DEFAULT_MIN_BOX_FRAC,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        check_unit("conf_th", self.conf_th)?;
        check_unit("iou_th", self.iou_th)?;
        check_box_frac(self.min_box_frac)
    }
}

fn check_unit(field: &'static str, value: f32) -> std::result::Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError {
            field,
            value,
            range: UNIT_RANGE,
        })
    }
}

fn check_box_frac(value: f32) -> std::result::Result<(), ValidationError> {
    if value > 0.0 && value <= 0.5 {
        Ok(())
    } else {
        Err(ValidationError {
            field: "min_box_frac",
            value,
            range: BOX_FRAC_RANGE,
        })
    }
}

/// Thresholds plus the store version they were read at.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ThresholdSnapshot {
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub version: u64,
}

/// Partial update; absent fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    #[serde(default)]
    pub conf_th: Option<f32>,
    #[serde(default)]
    pub iou_th: Option<f32>,
    #[serde(default)]
    pub min_box_frac: Option<f32>,
}

impl ThresholdUpdate {
    /// Validate every supplied field, then overlay them on `base`.
    pub fn apply_to(&self, base: Thresholds) -> std::result::Result<Thresholds, ValidationError> {
        if let Some(v) = self.conf_th {
            check_unit("conf_th", v)?;
        }
        if let Some(v) = self.iou_th {
            check_unit("iou_th", v)?;
        }
        if let Some(v) = self.min_box_frac {
            check_box_frac(v)?;
        }
        Ok(Thresholds {
            conf_th: self.conf_th.unwrap_or(base.conf_th),
            iou_th: self.iou_th.unwrap_or(base.iou_th),
            min_box_frac: self.min_box_frac.unwrap_or(base.min_box_frac),
        })
    }
}

// -------------------- Persistence --------------------

/// Durable storage for the threshold record.
pub trait ThresholdPersistence: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Thresholds>>;

    fn save(&self, thresholds: &Thresholds) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct PersistedThresholds {
    conf_th: Option<f32>,
    iou_th: Option<f32>,
    min_box_frac: Option<f32>,
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ThresholdPersistence for JsonFileStore {
    fn load(&self) -> Result<Option<Thresholds>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: PersistedThresholds = serde_json::from_str(&raw).map_err(|e| {
            DetectError::Storage(format!("invalid threshold file {}: {}", self.path.display(), e))
        })?;
        let defaults = Thresholds::default();
        Ok(Some(Thresholds {
            conf_th: file.conf_th.unwrap_or(defaults.conf_th),
            iou_th: file.iou_th.unwrap_or(defaults.iou_th),
            min_box_frac: file.min_box_frac.unwrap_or(defaults.min_box_frac),
        }))
    }

    fn save(&self, thresholds: &Thresholds) -> Result<()> {
        let json = serde_json::to_string_pretty(thresholds)
            .map_err(|e| DetectError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process storage, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Thresholds>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_saved(thresholds: Thresholds) -> Self {
        Self {
            saved: Mutex::new(Some(thresholds)),
        }
    }

    pub fn saved(&self) -> Option<Thresholds> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ThresholdPersistence for MemoryStore {
    fn load(&self) -> Result<Option<Thresholds>> {
        Ok(self.saved())
    }

    fn save(&self, thresholds: &Thresholds) -> Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(*thresholds);
        Ok(())
    }
}

// -------------------- Store --------------------

#[derive(Debug)]
struct StoreState {
    thresholds: Thresholds,
    version: u64,
}

/// Versioned, lock-protected threshold record.
pub struct ThresholdStore {
    state: Mutex<StoreState>,
    /// Version last written to `backend`. Serialises writers so an older copy never
    /// lands on top of a newer one.
    persisted: Mutex<u64>,
    backend: Box<dyn ThresholdPersistence>,
}

impl ThresholdStore {
    /// Build a store from persisted values, falling back to defaults on any problem.
    pub fn load<B: ThresholdPersistence + 'static>(backend: B) -> Self {
        let thresholds = match backend.load() {
            Ok(Some(t)) => match t.validate() {
                Ok(()) => {
                    log::info!(
                        "loaded thresholds conf_th={:.3} iou_th={:.3} min_box_frac={:.4}",
                        t.conf_th,
                        t.iou_th,
                        t.min_box_frac
                    );
                    t
                }
                Err(e) => {
                    log::warn!("persisted thresholds rejected ({}), using defaults", e);
                    Thresholds::default()
                }
            },
            Ok(None) => {
                log::info!("no persisted thresholds, using defaults");
                Thresholds::default()
            }
            Err(e) => {
                log::warn!("failed to load thresholds ({}), using defaults", e);
                Thresholds::default()
            }
        };
        Self {
            state: Mutex::new(StoreState {
                thresholds,
                version: 1,
            }),
            persisted: Mutex::new(0),
            backend: Box::new(backend),
        }
    }

    /// Store backed by `MemoryStore`, starting from defaults.
    pub fn in_memory() -> Self {
        Self::load(MemoryStore::new())
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> ThresholdSnapshot {
        let state = self.lock_state();
        ThresholdSnapshot {
            thresholds: state.thresholds,
            version: state.version,
        }
    }

    /// Apply a partial update. Any out-of-range field rejects the whole update.
    pub fn update(
        &self,
        update: &ThresholdUpdate,
    ) -> std::result::Result<ThresholdSnapshot, ValidationError> {
        let snapshot = {
            let mut state = self.lock_state();
            state.thresholds = update.apply_to(state.thresholds)?;
            state.version += 1;
            ThresholdSnapshot {
                thresholds: state.thresholds,
                version: state.version,
            }
        };
        log::info!(
            "thresholds v{}: conf_th={:.3} iou_th={:.3} min_box_frac={:.4}",
            snapshot.version,
            snapshot.thresholds.conf_th,
            snapshot.thresholds.iou_th,
            snapshot.thresholds.min_box_frac
        );
        self.persist(snapshot);
        Ok(snapshot)
    }

    /// Restore the documented defaults.
    pub fn reset(&self) -> ThresholdSnapshot {
        let snapshot = {
            let mut state = self.lock_state();
            state.thresholds = Thresholds::default();
            state.version += 1;
            ThresholdSnapshot {
                thresholds: state.thresholds,
                version: state.version,
            }
        };
        log::info!("thresholds v{}: reset to defaults", snapshot.version);
        self.persist(snapshot);
        snapshot
    }

    fn persist(&self, snapshot: ThresholdSnapshot) {
        let mut persisted = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        if *persisted >= snapshot.version {
            return;
        }
        match self.backend.save(&snapshot.thresholds) {
            Ok(()) => *persisted = snapshot.version,
            Err(e) => log::warn!("failed to persist thresholds v{}: {}", snapshot.version, e),
        }
    }
}
