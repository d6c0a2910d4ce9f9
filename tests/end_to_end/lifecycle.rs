//! A customer's book of policies over three months

use crate::common::*;

#[test]
fn test_amend_and_read_back_earlier_versions() {
    let (chronicle, store) = open(ChronicleConfig::default());
    let book = open_book(&chronicle, day(1, 10));
    assert_eq!(book.customer.entity_tag(), CUSTOMER);
    assert_eq!(book.home.entity_tag(), POLICY);
    assert!(book.car > book.home);

    // Premium increase effective February
    chronicle
        .unit_of_work(as_of(day(2, 1)), |uow| {
            uow.load(book.home)?;
            uow.lock(book.home, LockType::Update)?;
            uow.set(book.home, "premium", Value::Int(350))
        })
        .unwrap();

    // Reading as of mid-January shows the original premium
    let mut reader = chronicle.begin(as_of(day(1, 20)));
    reader.load(book.home).unwrap();
    assert!(reader.is_rolled_back(book.home));
    assert_eq!(reader.property(book.home, "premium").unwrap(), &Value::Int(300));
    reader.abort();

    // Reading as of March shows the amendment
    let mut reader = chronicle.begin(as_of(day(3, 1)));
    reader.load(book.home).unwrap();
    assert!(!reader.is_rolled_back(book.home));
    assert_eq!(reader.property(book.home, "premium").unwrap(), &Value::Int(350));
    reader.abort();

    assert_eq!(store.commit_log_len(), 2);
    // Insert: three rows. Amendment: the policy and its customer.
    assert_eq!(store.audit_log_len(), 5);
}

#[test]
fn test_cancelled_policy_stays_in_history() {
    let (chronicle, store) = open(ChronicleConfig::default());
    let book = open_book(&chronicle, day(1, 10));

    let (_, outcome) = chronicle
        .unit_of_work(as_of(day(3, 1)).with_comment("cancellation"), |uow| {
            uow.load(book.customer)?;
            uow.load(book.car)?;
            uow.lock(book.customer, LockType::Update)?;
            uow.lock(book.car, LockType::Delete)?;
            uow.detach_child(book.customer, "policies", book.car)?;
            uow.delete(book.car)
        })
        .unwrap();
    let tid = outcome.tid.unwrap();
    assert_eq!(store.object_count(), 2);

    let entry = chronicle.commit_log_entry(tid).unwrap().unwrap();
    assert_eq!(entry.comment.as_deref(), Some("cancellation"));

    let history = chronicle.history(book.car).unwrap();
    assert_eq!(history.len(), 2);
    let (row, delta) = history.last().unwrap();
    assert_eq!(row.action, AuditAction::Delete);
    assert_eq!(row.root_object_id, book.customer);
    assert_eq!(delta.replay().unwrap(), Replay::Deleted);
    assert_eq!(delta.prior.as_ref().unwrap().values[0], Value::Int(500));

    // The customer as of February still lists the cancelled policy
    let mut reader = chronicle.begin(as_of(day(2, 1)));
    reader.load(book.customer).unwrap();
    assert!(reader.is_rolled_back(book.customer));
    assert_eq!(reader.children(book.customer, "policies").unwrap(), &[book.home, book.car]);
    // but its row is gone from the store
    assert!(matches!(reader.load(book.car), Err(Error::ObjectNotFound(id)) if id == book.car));
    reader.abort();

    let mut reader = chronicle.begin(as_of(day(3, 2)));
    reader.load(book.customer).unwrap();
    assert_eq!(reader.children(book.customer, "policies").unwrap(), &[book.home]);
    reader.abort();
}

#[test]
fn test_undeclared_edit_never_reaches_the_store() {
    let (chronicle, store) = open(ChronicleConfig::default());
    let book = open_book(&chronicle, day(1, 10));
    let rows_before = store.audit_log_len();

    // Without a lock the edit is dropped at flush
    let (_, outcome) = chronicle
        .unit_of_work(as_of(day(2, 1)), |uow| {
            uow.load(book.home)?;
            uow.set(book.home, "premium", Value::Int(1))
        })
        .unwrap();
    assert!(outcome.is_empty());

    // Deleting without a Delete lock fails the whole unit of work
    let err = chronicle
        .unit_of_work(as_of(day(2, 1)), |uow| {
            uow.load(book.car)?;
            uow.lock(book.car, LockType::Update)?;
            uow.delete(book.car)
        })
        .unwrap_err();
    assert!(err.is_access_denied());

    assert_eq!(store.audit_log_len(), rows_before);
    let metrics = chronicle.metrics();
    assert_eq!(metrics.total_committed, 2);
    assert_eq!(metrics.total_aborted, 1);
}
