//! Engine settings loaded from `chronicle.toml`

use std::fs;

use tempfile::TempDir;

use crate::common::*;
use chronicle::CONFIG_FILE_NAME;

#[test]
fn test_settings_from_file_drive_the_commit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(
        &path,
        "audit_batch_size = 1\nstrict_update_locks = true\ndefault_comment = \"import\"\n",
    )
    .unwrap();
    let config = ChronicleConfig::from_file(&path).unwrap();
    assert_eq!(config.rollback_batch_size, 200);

    let (chronicle, _store) = open(config);
    let (book, outcome) = chronicle
        .unit_of_work(as_of(day(1, 10)), |uow| {
            let customer = uow.create(CUSTOMER)?;
            uow.create_owned(customer, "policies")?;
            Ok(customer)
        })
        .unwrap();
    assert_eq!(outcome.batches, 2);
    let entry = chronicle.commit_log_entry(outcome.tid.unwrap()).unwrap().unwrap();
    assert_eq!(entry.comment.as_deref(), Some("import"));

    // Strict mode: an Update lock without a write fails
    let err = chronicle
        .unit_of_work(as_of(day(2, 1)), |uow| {
            uow.load(book)?;
            uow.lock(book, LockType::Update).map(|_| ())
        })
        .unwrap_err();
    assert!(matches!(err, Error::ConsistencyViolation { object_id, .. } if object_id == book));
}

#[test]
fn test_invalid_file_is_rejected_before_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&path, "rollback_batch_size = 0\n").unwrap();

    let err = ChronicleConfig::from_file(&path).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_default_file_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    ChronicleConfig::write_default_if_missing(&path).unwrap();
    assert_eq!(ChronicleConfig::from_file(&path).unwrap(), ChronicleConfig::default());
}
