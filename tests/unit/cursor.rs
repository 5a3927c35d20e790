//! Last run cursor trust rules

use crate::common::ORG;
use catalog_export::resume::{CursorStatus, CursorStore};
use catalog_export::OrgId;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

const OTHER_ORG: &str = "9f8e7d6c-5b4a-4c3d-8e2f-1a0b9c8d7e6f";

fn org() -> OrgId {
    OrgId::parse(ORG).unwrap()
}

#[test]
fn test_matching_cursor_is_trusted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(
        &path,
        format!(r#"{{"orgid": "{ORG}", "updatedSince": "2024-03-01T12:00:00.000Z"}}"#),
    )
    .unwrap();

    let loaded = CursorStore::new(&path).load(&org());

    assert_eq!(loaded, Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
    assert!(path.exists());
}

#[test]
fn test_uppercase_org_id_still_matches() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(
        &path,
        format!(
            r#"{{"orgid": "{}", "updatedSince": "2024-03-01T12:00:00Z"}}"#,
            ORG.to_uppercase()
        ),
    )
    .unwrap();

    assert!(CursorStore::new(&path).load(&org()).is_some());
}

#[test]
fn test_cursor_of_other_org_is_deleted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(
        &path,
        format!(r#"{{"orgid": "{OTHER_ORG}", "updatedSince": "2024-03-01T12:00:00Z"}}"#),
    )
    .unwrap();

    assert_eq!(CursorStore::new(&path).load(&org()), None);
    assert!(!path.exists());
}

#[test]
fn test_invalid_timestamp_is_deleted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(
        &path,
        format!(r#"{{"orgid": "{ORG}", "updatedSince": "yesterday"}}"#),
    )
    .unwrap();

    assert_eq!(CursorStore::new(&path).load(&org()), None);
    assert!(!path.exists());
}

#[test]
fn test_garbage_file_is_deleted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(&path, "not json at all").unwrap();

    assert_eq!(CursorStore::new(&path).load(&org()), None);
    assert!(!path.exists());
}

#[test]
fn test_inspect_does_not_delete() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(&path, "{}").unwrap();

    assert!(matches!(
        CursorStore::new(&path).inspect(&org()),
        CursorStatus::Invalid(_)
    ));
    assert!(path.exists());
}

#[test]
fn test_store_then_load() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path().join("lastrun.json"));
    let started = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

    store.store(&org(), started).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"updatedSince\": \"2024-05-06T07:08:09.000Z\""));
    assert_eq!(store.load(&org()), Some(started));
}

#[test]
fn test_cursor_with_unknown_key_is_deleted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(
        &path,
        format!(r#"{{"orgid": "{ORG}", "updatedSince": "2023-01-01T00:00:00Z", "extra": 1}}"#),
    )
    .unwrap();

    assert_eq!(CursorStore::new(&path).load(&org()), None);
    assert!(!path.exists());
}

#[test]
fn test_reading_cursor_leaves_no_lock_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(
        &path,
        format!(r#"{{"orgid": "{ORG}", "updatedSince": "2024-03-01T12:00:00Z"}}"#),
    )
    .unwrap();
    let store = CursorStore::new(&path);

    assert!(matches!(store.inspect(&org()), CursorStatus::Trusted(_)));
    assert!(store.load(&org()).is_some());
    assert!(!dir.path().join("lastrun.lock").exists());
}

#[test]
fn test_discard_runs_under_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lastrun.json");
    std::fs::write(&path, "{}").unwrap();

    assert_eq!(CursorStore::new(&path).load(&org()), None);
    assert!(!path.exists());
    assert!(dir.path().join("lastrun.lock").exists());
}
