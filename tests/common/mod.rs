//! Shared test utilities for the end-to-end suites.
//!
//! A Customer aggregate (Customer -> Policy) over a MemoryStore.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

pub use chronicle::{
    AuditAction, Chronicle, ChronicleConfig, EntityDescriptor, EntityRegistry, EntityTag, Error, LockType,
    MemoryStore, ObjectId, PropertyKind, Replay, UnitOfWorkOptions, Value,
};

pub const CUSTOMER: EntityTag = EntityTag(20);
pub const POLICY: EntityTag = EntityTag(21);

pub fn day(month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, d, 0, 0, 0).unwrap()
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register(
            EntityDescriptor::new(CUSTOMER, "Customer")
                .property("name", PropertyKind::Text)
                .owns("policies", POLICY),
        )
        .register(
            EntityDescriptor::new(POLICY, "Policy")
                .property("premium", PropertyKind::Int)
                .property("starts", PropertyKind::Timestamp),
        )
        .build()
        .unwrap()
}

pub fn open(config: ChronicleConfig) -> (Chronicle, Arc<MemoryStore>) {
    let registry = registry();
    let store = Arc::new(MemoryStore::with_counters(&registry));
    let chronicle = Chronicle::open(registry, Arc::clone(&store) as Arc<dyn chronicle::Store>, config).unwrap();
    (chronicle, store)
}

pub fn as_of(at: DateTime<Utc>) -> UnitOfWorkOptions {
    UnitOfWorkOptions::new().with_as_of(at)
}

/// A customer with two policies
pub struct Book {
    pub customer: ObjectId,
    pub home: ObjectId,
    pub car: ObjectId,
}

pub fn open_book(chronicle: &Chronicle, at: DateTime<Utc>) -> Book {
    let (book, _) = chronicle
        .unit_of_work(as_of(at), |uow| {
            let customer = uow.create(CUSTOMER)?;
            uow.set(customer, "name", Value::Text("Ada".into()))?;
            let home = uow.create_owned(customer, "policies")?;
            uow.set(home, "premium", Value::Int(300))?;
            uow.set(home, "starts", Value::Timestamp(at))?;
            let car = uow.create_owned(customer, "policies")?;
            uow.set(car, "premium", Value::Int(500))?;
            uow.set(car, "starts", Value::Timestamp(at))?;
            Ok(Book { customer, home, car })
        })
        .unwrap();
    book
}
