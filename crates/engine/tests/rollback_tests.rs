//! Rollback of tracked objects to the version effective at the as-of date

mod common;

use common::*;

use chronicle_core::{LockType, Value};
use chronicle_engine::ChronicleConfig;

#[test]
fn test_load_rolls_back_newer_version() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));
    fx.update_qty(seeded.line1, 5, day(2, 1));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 20)));
    uow.load(seeded.line1).unwrap();

    assert!(uow.is_rolled_back(seeded.line1));
    assert_eq!(uow.property(seeded.line1, "qty").unwrap(), &Value::Int(1));
    assert_eq!(uow.get(seeded.line1).unwrap().valid_from, day(1, 10));
    assert_eq!(fx.chronicle.metrics().total_rolled_back, 1);
    uow.abort();
}

#[test]
fn test_current_version_is_not_rolled_back() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));
    fx.update_qty(seeded.line1, 5, day(2, 1));

    let mut uow = fx.chronicle.begin(fx.options(day(3, 1)));
    uow.load(seeded.line1).unwrap();

    assert!(!uow.is_rolled_back(seeded.line1));
    assert_eq!(uow.property(seeded.line1, "qty").unwrap(), &Value::Int(5));
    uow.abort();
}

#[test]
fn test_rollback_is_idempotent() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));
    fx.update_qty(seeded.line1, 5, day(2, 1));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 20)));
    uow.load(seeded.line1).unwrap();
    let first = uow.get(seeded.line1).unwrap().clone();

    uow.request_rollback(&[seeded.line1]).unwrap();
    let report = uow.rollback_events();
    assert!(!report.rolled_back_any());
    assert_eq!(report.unchanged, vec![seeded.line1]);
    assert!(report.is_clean());
    assert_eq!(uow.get(seeded.line1).unwrap(), &first);
    uow.abort();
}

#[test]
fn test_rollback_of_untracked_object_is_rejected() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 20)));
    assert!(uow.request_rollback(&[seeded.line1]).is_err());
    assert!(!uow.rollback_events().rolled_back_any());
    uow.abort();
}

#[test]
fn test_load_many_rolls_back_in_batches() {
    let fx = Fixture::with_config(ChronicleConfig {
        rollback_batch_size: 1,
        ..ChronicleConfig::default()
    });
    let seeded = fx.seed_order(day(1, 10));
    fx.update_qty(seeded.line1, 5, day(2, 1));
    fx.update_qty(seeded.line2, 6, day(2, 1));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 20)));
    let report = uow.load_many(&[seeded.order, seeded.line1, seeded.line2]).unwrap();

    assert_eq!(report.rolled_back, vec![seeded.line1, seeded.line2]);
    assert!(report.unchanged.is_empty());
    assert_eq!(uow.property(seeded.line2, "qty").unwrap(), &Value::Int(2));
    uow.abort();
}

#[test]
fn test_edit_after_rollback_is_audited_against_replayed_state() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));
    fx.update_qty(seeded.line1, 5, day(2, 1));

    let mut uow = fx.chronicle.begin(fx.options(day(1, 20)));
    uow.load(seeded.line1).unwrap();
    uow.lock(seeded.line1, LockType::Update).unwrap();
    uow.set(seeded.line1, "qty", Value::Int(7)).unwrap();
    let outcome = uow.commit().unwrap();
    let tid = outcome.tid.unwrap();

    let history = fx.chronicle.history(seeded.line1).unwrap();
    let (row, delta) = history.last().unwrap();
    assert_eq!(row.tid, tid);
    assert_eq!(row.valid_from, day(1, 20));
    assert!(delta.rolled_back);
    assert_eq!(delta.prior.as_ref().unwrap().values[0], Value::Int(1));
    assert_eq!(delta.new.as_ref().unwrap().values[0], Value::Int(7));

    // The rolled-back tag covers the whole aggregate
    let (_, order_delta) = fx.chronicle.history(seeded.order).unwrap().pop().unwrap();
    assert!(order_delta.rolled_back);
}

#[test]
fn test_rollback_past_deletion_marks_object_deleted() {
    let fx = Fixture::new();
    let seeded = fx.seed_order(day(1, 10));

    // Reader tracks the line before it is deleted
    let mut reader = fx.chronicle.begin(fx.options(day(3, 10)));
    reader.load(seeded.line2).unwrap();

    fx.chronicle
        .unit_of_work(fx.options(day(3, 1)), |uow| {
            uow.load(seeded.order)?;
            uow.load(seeded.line2)?;
            uow.lock(seeded.order, LockType::Update)?;
            uow.lock(seeded.line2, LockType::Delete)?;
            uow.detach_child(seeded.order, "lines", seeded.line2)?;
            uow.delete(seeded.line2)
        })
        .unwrap();

    reader.request_rollback(&[seeded.line2]).unwrap();
    let report = reader.rollback_events();
    assert_eq!(report.rolled_back, vec![seeded.line2]);
    assert!(reader.is_deleted(seeded.line2));
    assert!(reader.get(seeded.line2).is_err());

    // Nothing left to report for the deleted object
    let outcome = reader.commit().unwrap();
    assert!(outcome.is_empty());
}
