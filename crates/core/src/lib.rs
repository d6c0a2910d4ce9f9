//! Core types for chronicle
//!
//! This crate defines the foundational types used throughout the system:
//! - ObjectId / EntityTag / Tid: bit-packed identifiers
//! - Value / PropertyKind: property values and declared types
//! - EntityDescriptor / EntityRegistry: static entity metadata
//! - PersistentObject: in-memory object state
//! - Lock / LockType / LifecycleAction / AuditAction: intent and action vocabulary
//! - CommitLogEntry / AuditLogRow: audit trail records
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod entity;
pub mod error;
pub mod lock;
pub mod object;
pub mod types;
pub mod value;

pub use audit::{AuditLogRow, AuditLookup, CommitLogEntry, NewCommitLogEntry};
pub use entity::{
    EntityDescriptor, EntityRegistry, EntityRegistryBuilder, HistorizationPolicy, OwnershipEdge,
    PropertyDescriptor,
};
pub use error::{Error, Result};
pub use lock::{AuditAction, LifecycleAction, Lock, LockType};
pub use object::PersistentObject;
pub use types::{EntityTag, ObjectId, Tid, HI_BITS, HI_LIMIT, LO_BITS, RESERVATION_SIZE, SEQUENCE_LIMIT, TAG_BITS};
pub use value::{PropertyKind, Value};
