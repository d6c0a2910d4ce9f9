//! Chronicle - audit trail, identifier allocation and bitemporal rollback
//!
//! Chronicle sits underneath a persistence layer for long-lived business
//! entities. It allocates type-tagged identifiers, checks that every write
//! was declared with a lock, records each commit as an append-only bitemporal
//! audit trail, and replays that trail to show objects as they were.
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle::{Chronicle, ChronicleConfig, EntityDescriptor, EntityRegistry, EntityTag,
//!                 LockType, MemoryStore, PropertyKind, UnitOfWorkOptions, Value};
//! use std::sync::Arc;
//!
//! const ORDER: EntityTag = EntityTag(7);
//!
//! let registry = EntityRegistry::builder()
//!     .register(EntityDescriptor::new(ORDER, "Order").property("total", PropertyKind::Int))
//!     .build()?;
//! let store = Arc::new(MemoryStore::with_counters(&registry));
//! let chronicle = Chronicle::open(registry, store, ChronicleConfig::default())?;
//!
//! // Create
//! let (order, _) = chronicle.unit_of_work(UnitOfWorkOptions::new(), |uow| {
//!     let order = uow.create(ORDER)?;
//!     uow.set(order, "total", Value::Int(100))?;
//!     Ok(order)
//! })?;
//!
//! // Update: declare the intent first
//! chronicle.unit_of_work(UnitOfWorkOptions::new(), |uow| {
//!     uow.load(order)?;
//!     uow.lock(order, LockType::Update)?;
//!     uow.set(order, "total", Value::Int(120))
//! })?;
//!
//! // Every version, oldest first
//! let history = chronicle.history(order)?;
//! ```
//!
//! # Architecture
//!
//! - `chronicle-core`: identifiers, entity metadata, values, locks, audit records, errors
//! - `chronicle-storage`: the relational store seam and `MemoryStore`
//! - `chronicle-concurrency`: identifier allocator, lock registry, action validator
//! - `chronicle-durability`: delta codec, delta trees, audit log materializer
//! - `chronicle-engine`: `Chronicle` handle, unit of work, commit and rollback

pub use chronicle_core::{
    AuditAction, AuditLogRow, CommitLogEntry, EntityDescriptor, EntityRegistry, EntityTag, Error,
    HistorizationPolicy, LifecycleAction, Lock, LockType, ObjectId, PersistentObject, PropertyKind,
    Result, Tid, Value,
};
pub use chronicle_durability::{Delta, Replay};
pub use chronicle_engine::{
    Chronicle, ChronicleConfig, CommitOutcome, RollbackReport, UnitOfWork, UnitOfWorkMetrics,
    UnitOfWorkOptions, CONFIG_FILE_NAME,
};
pub use chronicle_storage::{MemoryStore, Store, StoreTransaction};
