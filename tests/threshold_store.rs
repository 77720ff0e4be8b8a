use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use dermavision::{
    JsonFileStore, MemoryStore, ThresholdPersistence, ThresholdStore, ThresholdUpdate, Thresholds,
};

fn file_store(dir: &TempDir) -> JsonFileStore {
    JsonFileStore::new(dir.path().join("thresholds.json"))
}

#[test]
fn missing_file_starts_from_defaults() {
    let dir = TempDir::new().unwrap();
    let store = ThresholdStore::load(file_store(&dir));
    let snap = store.get();
    assert_eq!(snap.thresholds, Thresholds::default());
    assert_eq!(snap.version, 1);
    assert!(!dir.path().join("thresholds.json").exists());
}

#[test]
fn updates_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let store = ThresholdStore::load(file_store(&dir));
    store
        .update(&ThresholdUpdate {
            conf_th: Some(0.45),
            min_box_frac: Some(0.01),
            ..Default::default()
        })
        .unwrap();
    drop(store);

    let reloaded = ThresholdStore::load(file_store(&dir));
    let snap = reloaded.get();
    assert_eq!(snap.version, 1);
    assert_eq!(
        snap.thresholds,
        Thresholds {
            conf_th: 0.45,
            iou_th: 0.30,
            min_box_frac: 0.01,
        }
    );
}

#[test]
fn rejected_update_leaves_memory_and_file_untouched() {
    let dir = TempDir::new().unwrap();
    let store = ThresholdStore::load(file_store(&dir));
    store
        .update(&ThresholdUpdate {
            iou_th: Some(0.4),
            ..Default::default()
        })
        .unwrap();
    let before = store.get();
    let on_disk = std::fs::read_to_string(dir.path().join("thresholds.json")).unwrap();

    let err = store
        .update(&ThresholdUpdate {
            conf_th: Some(1.5),
            ..Default::default()
        })
        .unwrap_err();

    assert_eq!(err.field, "conf_th");
    assert_eq!(err.to_string(), "conf_th = 1.5 is out of range, expected [0, 1]");
    assert_eq!(store.get(), before);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("thresholds.json")).unwrap(),
        on_disk
    );
}

#[test]
fn corrupt_or_out_of_range_files_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("thresholds.json");

    std::fs::write(&path, "{ conf_th: ").unwrap();
    assert_eq!(
        ThresholdStore::load(JsonFileStore::new(&path)).get().thresholds,
        Thresholds::default()
    );

    std::fs::write(&path, r#"{"conf_th": 0.5, "iou_th": 2.0, "min_box_frac": 0.01}"#).unwrap();
    assert_eq!(
        ThresholdStore::load(JsonFileStore::new(&path)).get().thresholds,
        Thresholds::default()
    );
}

#[test]
fn missing_keys_take_their_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("thresholds.json");
    std::fs::write(&path, r#"{"iou_th": 0.55}"#).unwrap();

    let snap = ThresholdStore::load(JsonFileStore::new(&path)).get();
    assert_eq!(snap.thresholds.iou_th, 0.55);
    assert_eq!(snap.thresholds.conf_th, 0.60);
    assert_eq!(snap.thresholds.min_box_frac, 0.003);
}

#[test]
fn reset_writes_defaults_to_disk() {
    let dir = TempDir::new().unwrap();
    let store = ThresholdStore::load(file_store(&dir));
    store
        .update(&ThresholdUpdate {
            conf_th: Some(0.2),
            ..Default::default()
        })
        .unwrap();
    let snap = store.reset();
    assert_eq!(snap.version, 3);

    let persisted = file_store(&dir).load().unwrap();
    assert_eq!(persisted, Some(Thresholds::default()));
}

#[test]
fn concurrent_writers_leave_newest_values_persisted() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ThresholdStore::load(file_store(&dir)));

    let writers: Vec<_> = (0..8)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let v = (w * 50 + i) as f32 / 1000.0;
                    store
                        .update(&ThresholdUpdate {
                            conf_th: Some(v),
                            iou_th: Some(v),
                            min_box_frac: Some(v + 0.001),
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for _ in 0..1_000 {
        let t = store.get().thresholds;
        if t != Thresholds::default() {
            assert_eq!(t.conf_th, t.iou_th, "torn read: {t:?}");
            assert!((t.min_box_frac - t.conf_th - 0.001).abs() < 1e-6);
        }
    }
    for writer in writers {
        writer.join().unwrap();
    }

    let snap = store.get();
    assert_eq!(snap.version, 1 + 8 * 50);
    assert_eq!(file_store(&dir).load().unwrap(), Some(snap.thresholds));
}

#[test]
fn memory_store_records_saves() {
    let memory = Arc::new(MemoryStore::new());
    struct Shared(Arc<MemoryStore>);
    impl ThresholdPersistence for Shared {
        fn load(&self) -> dermavision::error::Result<Option<Thresholds>> {
            self.0.load()
        }
        fn save(&self, thresholds: &Thresholds) -> dermavision::error::Result<()> {
            self.0.save(thresholds)
        }
    }

    let store = ThresholdStore::load(Shared(memory.clone()));
    assert_eq!(memory.saved(), None);
    let snap = store
        .update(&ThresholdUpdate {
            iou_th: Some(0.25),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(memory.saved(), Some(snap.thresholds));
}
