//! Valid-from stamping per historization policy

mod common;

use common::*;

use chrono::{Duration, Timelike};

use chronicle_core::{Error, LockType, Value};

fn seed(fx: &Fixture, tag: chronicle_core::EntityTag, property: &str, value: Value) -> chronicle_core::ObjectId {
    let (id, _) = fx
        .chronicle
        .unit_of_work(fx.options(day(1, 10)), |uow| {
            let id = uow.create(tag)?;
            uow.set(id, property, value)?;
            Ok(id)
        })
        .unwrap();
    id
}

// ============================================================================
// Policy All
// ============================================================================

#[test]
fn test_all_policy_stamps_as_of() {
    let fx = Fixture::new();
    let contract = seed(&fx, CONTRACT, "premium", Value::Int(100));

    let mut uow = fx.chronicle.begin(fx.options(day(2, 1)));
    uow.load(contract).unwrap();
    uow.lock(contract, LockType::Update).unwrap();
    uow.set(contract, "premium", Value::Int(120)).unwrap();
    uow.set_valid_from(contract, day(1, 20)).unwrap();
    let outcome = uow.commit().unwrap();

    let rows = fx.store.audit_rows_for(outcome.tid.unwrap());
    assert_eq!(rows[0].valid_from, day(2, 1));
}

#[test]
fn test_all_policy_ignores_caller_value_on_insert() {
    let fx = Fixture::new();
    let mut uow = fx.chronicle.begin(fx.options(day(1, 10)));
    let contract = uow.create(CONTRACT).unwrap();
    uow.set_valid_from(contract, day(1, 1)).unwrap();
    let outcome = uow.commit().unwrap();

    let rows = fx.store.audit_rows_for(outcome.tid.unwrap());
    assert_eq!(rows[0].valid_from, day(1, 10));
}

#[test]
fn test_as_of_before_inception_is_rejected() {
    let fx = Fixture::new();
    let contract = seed(&fx, CONTRACT, "premium", Value::Int(100));
    let audit_rows = fx.store.audit_log_len();

    let mut uow = fx.chronicle.begin(fx.options(day(1, 5)));
    uow.load(contract).unwrap();
    uow.lock(contract, LockType::Update).unwrap();
    uow.set(contract, "premium", Value::Int(200)).unwrap();
    let err = uow.commit().unwrap_err();

    match err {
        Error::BitemporalViolation {
            object_id,
            entity,
            as_of,
            valid_from,
        } => {
            assert_eq!(object_id, contract);
            assert_eq!(entity, "Contract");
            assert_eq!(as_of, day(1, 5));
            assert_eq!(valid_from, day(1, 10));
        }
        other => panic!("expected a bitemporal violation, got {other:?}"),
    }
    assert_eq!(fx.store.audit_log_len(), audit_rows);
    assert_eq!(fx.store.commit_log_len(), 1);
}

// ============================================================================
// Policy None
// ============================================================================

#[test]
fn test_none_policy_passes_caller_value_through() {
    let fx = Fixture::new();
    let note = seed(&fx, NOTE, "text", Value::Text("draft".into()));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 15)));
    uow.load(note).unwrap();
    uow.lock(note, LockType::Update).unwrap();
    uow.set(note, "text", Value::Text("final".into())).unwrap();
    let outcome = uow.commit().unwrap();
    let rows = fx.store.audit_rows_for(outcome.tid.unwrap());
    assert_eq!(rows[0].valid_from, day(1, 10));

    let mut uow = fx.chronicle.begin(fx.options(day(3, 1)));
    uow.load(note).unwrap();
    uow.lock(note, LockType::Update).unwrap();
    uow.set(note, "text", Value::Text("signed".into())).unwrap();
    uow.set_valid_from(note, day(1, 20)).unwrap();
    let outcome = uow.commit().unwrap();
    let rows = fx.store.audit_rows_for(outcome.tid.unwrap());
    assert_eq!(rows[0].valid_from, day(1, 20));
}

#[test]
fn test_none_policy_still_rejects_as_of_before_inception() {
    let fx = Fixture::new();
    let note = seed(&fx, NOTE, "text", Value::Text("draft".into()));
    let audit_rows = fx.store.audit_log_len();

    let mut uow = fx.chronicle.begin(fx.options(day(1, 5)));
    uow.load(note).unwrap();
    uow.lock(note, LockType::Update).unwrap();
    uow.set(note, "text", Value::Text("final".into())).unwrap();
    let err = uow.commit().unwrap_err();

    assert!(matches!(err, Error::BitemporalViolation { object_id, as_of, valid_from, .. }
        if object_id == note && as_of == day(1, 5) && valid_from == day(1, 10)));
    assert_eq!(fx.store.audit_log_len(), audit_rows);
}

// ============================================================================
// Policy Default
// ============================================================================

#[test]
fn test_default_policy_new_root_keeps_caller_value_for_whole_aggregate() {
    let fx = Fixture::new();
    let mut uow = fx.chronicle.begin(fx.options(day(1, 10)));
    let order = uow.create(ORDER).unwrap();
    uow.create_owned(order, "lines").unwrap();
    uow.set_valid_from(order, day(1, 1)).unwrap();
    let outcome = uow.commit().unwrap();

    let rows = fx.store.audit_rows_for(outcome.tid.unwrap());
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.valid_from == day(1, 1)));
}

#[test]
fn test_default_policy_violation_names_the_root() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 5)));
    uow.load(seeded.line1).unwrap();
    uow.lock(seeded.line1, LockType::Update).unwrap();
    uow.set(seeded.line1, "qty", Value::Int(3)).unwrap();
    let err = uow.commit().unwrap_err();

    assert!(matches!(err, Error::BitemporalViolation { object_id, .. } if object_id == seeded.order));
}

// ============================================================================
// Precision
// ============================================================================

#[test]
fn test_as_of_is_kept_at_store_precision() {
    let fx = Fixture::new();
    let precise = day(1, 10) + Duration::nanoseconds(123_456_789);
    let options = fx.options(precise);
    assert_eq!(options.as_of.nanosecond(), 123_456_000);

    let (order, _) = fx
        .chronicle
        .unit_of_work(options.clone(), |uow| uow.create(ORDER))
        .unwrap();

    // Same as-of: the stored version is not newer, so nothing is rolled back
    let mut uow = fx.chronicle.begin(options.with_correlation_id(uuid::Uuid::new_v4()));
    uow.load(order).unwrap();
    assert!(!uow.is_rolled_back(order));
    assert_eq!(uow.get(order).unwrap().valid_from, uow.as_of());
    uow.abort();
}
