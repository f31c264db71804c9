//! Feeder catalog load/save behaviour against real files.

mod common;

use common::*;
use feeder_tuner::angle::AngleValue;
use feeder_tuner::registry::{FeederRegistry, RegistryError};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[test]
fn test_round_trip_keeps_persisted_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeders.json");

    let mut registry = FeederRegistry::new();
    registry.insert(tuned_feeder("F1")).unwrap();
    let blank = registry.create("F2", None).unwrap();
    blank.set_current_angle(AngleValue::normalize(77));
    blank.set_enabled(true);
    registry.save(&path).unwrap();

    let loaded = FeederRegistry::load(&path);
    assert_eq!(loaded.list(), registry.list());

    // Session state is not persisted.
    let f2 = loaded.get("F2").unwrap();
    assert_eq!(f2.current_angle(), None);
    assert!(!f2.enabled());
}

#[test]
fn test_missing_file_is_an_empty_registry() {
    let dir = TempDir::new().unwrap();
    let registry = FeederRegistry::load(dir.path().join("nope.json"));
    assert!(registry.is_empty());
}

#[test]
fn test_malformed_file_is_an_empty_registry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeders.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    assert!(FeederRegistry::load(&path).is_empty());
    // The bad file is left for the user to inspect.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ this is not json");
}

#[test]
fn test_float_valued_catalog_survives_edit_and_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeders.json");
    std::fs::write(
        &path,
        r#"[{"id": "F1", "model": "0805", "advance_angle": 150.0, "default_feed_length": 4.0, "settle_time": 250.0}]"#,
    )
    .unwrap();

    let mut registry = FeederRegistry::load(&path);
    assert_eq!(registry.len(), 1);
    registry.create("F2", None).unwrap();
    registry.save(&path).unwrap();

    let reloaded = FeederRegistry::load(&path);
    let f1 = reloaded.get("F1").unwrap();
    assert_eq!(f1.model.as_deref(), Some("0805"));
    assert_eq!(f1.advance_angle(), Some(AngleValue::normalize(150)));
    assert_eq!(f1.default_feed_length, Some(4));
    assert_eq!(f1.settle_time, Some(250));
    assert!(reloaded.contains("F2"));
}

#[test]
fn test_saving_empty_registry_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeders.json");

    FeederRegistry::new().save(&path).unwrap();
    assert!(!path.exists());

    registry_with(&["F1"]).save(&path).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();
    FeederRegistry::new().save(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_write_persists_deleting_the_last_feeder() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeders.json");

    let mut registry = registry_with(&["F1"]);
    registry.save(&path).unwrap();
    registry.delete("F1").unwrap();
    registry.write(&path).unwrap();

    assert!(FeederRegistry::load(&path).is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
}

#[test]
fn test_clone_then_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("feeders.json");

    let mut registry = FeederRegistry::new();
    registry.insert(tuned_feeder("F1")).unwrap();
    registry.clone_feeder("F1", "F1-copy").unwrap();
    registry.save(&path).unwrap();

    let loaded = FeederRegistry::load(&path);
    let ids: Vec<&str> = loaded.iter().map(|f| f.id()).collect();
    assert_eq!(ids, vec!["F1", "F1-copy"]);

    let mut expected = loaded.get("F1").unwrap().to_record();
    expected.id = "F1-copy".to_string();
    assert_eq!(loaded.get("F1-copy").unwrap().to_record(), expected);
}

#[test]
fn test_failed_clone_changes_nothing() {
    let mut registry = registry_with(&["F1", "F2"]);
    let before = registry.clone();

    assert!(matches!(registry.clone_feeder("F1", "F2"), Err(RegistryError::DuplicateId(id)) if id == "F2"));
    assert!(matches!(registry.clone_feeder("F9", "F3"), Err(RegistryError::NotFound(id)) if id == "F9"));
    assert_eq!(registry, before);
}

#[test]
fn test_legacy_records_with_odd_angles_are_normalized() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feeders.json");
    std::fs::write(
        &path,
        r#"[{"id": "OLD", "advance_angle": 370, "retract_angle": -20, "feedback_monitored": false}]"#,
    )
    .unwrap();

    let registry = FeederRegistry::load(&path);
    let old = registry.get("OLD").unwrap();
    assert_eq!(old.advance_angle(), Some(AngleValue::normalize(10)));
    assert_eq!(old.retract_angle(), Some(AngleValue::normalize(340)));
    assert_eq!(old.half_advance_angle(), None);
}
