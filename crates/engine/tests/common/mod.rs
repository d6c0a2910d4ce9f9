//! Shared fixture: an Order aggregate (Order -> OrderLine) over a MemoryStore

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use chronicle_core::{EntityDescriptor, EntityRegistry, EntityTag, HistorizationPolicy, ObjectId, PropertyKind, Value};
use chronicle_engine::{Chronicle, ChronicleConfig, UnitOfWorkOptions};
use chronicle_storage::MemoryStore;

pub const ORDER: EntityTag = EntityTag(7);
pub const LINE: EntityTag = EntityTag(8);
/// Root type that always stamps the as-of date
pub const CONTRACT: EntityTag = EntityTag(10);
/// Root type that always passes the caller's valid-from through
pub const NOTE: EntityTag = EntityTag(11);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn day(month: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, d, 0, 0, 0).unwrap()
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::builder()
        .register(
            EntityDescriptor::new(ORDER, "Order")
                .property("number", PropertyKind::Text)
                .property("total", PropertyKind::Int)
                .owns("lines", LINE),
        )
        .register(EntityDescriptor::new(LINE, "OrderLine").property("qty", PropertyKind::Int))
        .register(
            EntityDescriptor::new(CONTRACT, "Contract")
                .property("premium", PropertyKind::Int)
                .policy(HistorizationPolicy::All),
        )
        .register(
            EntityDescriptor::new(NOTE, "Note")
                .property("text", PropertyKind::Text)
                .policy(HistorizationPolicy::None),
        )
        .build()
        .unwrap()
}

pub struct Fixture {
    pub chronicle: Chronicle,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ChronicleConfig::default())
    }

    pub fn with_config(config: ChronicleConfig) -> Self {
        init_tracing();
        let registry = registry();
        let store = Arc::new(MemoryStore::with_counters(&registry));
        let chronicle = Chronicle::open(registry, Arc::clone(&store) as Arc<dyn chronicle_storage::Store>, config).unwrap();
        Fixture { chronicle, store }
    }

    pub fn options(&self, as_of: DateTime<Utc>) -> UnitOfWorkOptions {
        UnitOfWorkOptions::new().with_as_of(as_of)
    }

    /// Commit an order with two lines (qty 1 and 2) as of `as_of`
    pub fn seed_order(&self, as_of: DateTime<Utc>) -> SeededOrder {
        let (seeded, _) = self
            .chronicle
            .unit_of_work(self.options(as_of), |uow| {
                let order = uow.create(ORDER)?;
                uow.set(order, "number", Value::Text("A-1".into()))?;
                let line1 = uow.create_owned(order, "lines")?;
                uow.set(line1, "qty", Value::Int(1))?;
                let line2 = uow.create_owned(order, "lines")?;
                uow.set(line2, "qty", Value::Int(2))?;
                Ok(SeededOrder { order, line1, line2 })
            })
            .unwrap();
        seeded
    }

    /// Set the quantity of a line as of `as_of`
    pub fn update_qty(&self, line: ObjectId, qty: i64, as_of: DateTime<Utc>) {
        self.chronicle
            .unit_of_work(self.options(as_of), |uow| {
                uow.load(line)?;
                uow.lock(line, chronicle_core::LockType::Update)?;
                uow.set(line, "qty", Value::Int(qty))
            })
            .unwrap();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeededOrder {
    pub order: ObjectId,
    pub line1: ObjectId,
    pub line2: ObjectId,
}
