//! Error types for chronicle
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - Configuration errors: missing or malformed counter rows, unknown entity
//!   metadata. Fatal, never retried.
//! - Consistency violations: observed writes do not match declared intent, or
//!   history would be recorded before an object's inception. Abort the commit.
//! - Access denied: a mutation with no lock, or a lock that does not authorize
//!   the observed action. Kept apart from consistency violations because the
//!   remediation differs.
//! - Delta decode errors: a stored delta cannot be replayed. Reported for the
//!   one object being rolled back.
//!
//! Allocator contention is not an error; it is retried transparently.

use crate::lock::LockType;
use crate::types::{EntityTag, ObjectId};
use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;

/// Result type alias for chronicle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chronicle
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Entity tag not present in the registry
    #[error("Unknown entity type with tag {tag}")]
    UnknownEntity {
        /// The unregistered tag
        tag: EntityTag,
    },

    /// Identifier counter row does not exist for an entity type
    #[error("Identifier counter row missing for entity {entity} (tag {tag})")]
    CounterMissing {
        /// Entity tag
        tag: EntityTag,
        /// Entity name
        entity: String,
    },

    /// Identifier counter row holds a value that is not block aligned
    #[error("Identifier counter for entity {entity} holds {value}, which is not a multiple of the reservation size")]
    CounterMisaligned {
        /// Entity tag
        tag: EntityTag,
        /// Entity name
        entity: String,
        /// Value read from the counter row
        value: u64,
    },

    /// All 40-bit hi blocks of an entity type have been reserved
    #[error("Identifier space exhausted for entity {entity} (tag {tag})")]
    IdSpaceExhausted {
        /// Entity tag
        tag: EntityTag,
        /// Entity name
        entity: String,
    },

    /// A second, incompatible lock was requested for the same object
    #[error("Lock conflict on {object_id}: holds {held:?}, requested {requested:?}")]
    LockConflict {
        /// Locked object
        object_id: ObjectId,
        /// Lock type already held
        held: LockType,
        /// Lock type requested
        requested: LockType,
    },

    /// Observed writes do not match the declared intent
    #[error("Consistency violation on {entity} {object_id}: {reason}")]
    ConsistencyViolation {
        /// Offending object
        object_id: ObjectId,
        /// Entity name
        entity: String,
        /// What did not match
        reason: String,
    },

    /// Mutation without a lock, or with a lock that does not authorize it
    #[error("Access denied on {entity} {object_id}: {reason}")]
    AccessDenied {
        /// Offending object
        object_id: ObjectId,
        /// Entity name
        entity: String,
        /// What was attempted
        reason: String,
    },

    /// History would be written before the object's own inception
    #[error("Bitemporal violation on {entity} {object_id}: as-of {as_of} precedes valid-from {valid_from}")]
    BitemporalViolation {
        /// Offending aggregate root
        object_id: ObjectId,
        /// Entity name
        entity: String,
        /// As-of date of the unit of work
        as_of: DateTime<Utc>,
        /// Current valid-from of the object
        valid_from: DateTime<Utc>,
    },

    /// Stored delta could not be decoded or replayed
    #[error("Delta decode error: {reason}")]
    DeltaDecode {
        /// Decoder message
        reason: String,
    },

    /// Property value does not match the declared property kind
    #[error("Type mismatch for {entity}.{property}: {reason}")]
    TypeMismatch {
        /// Entity name
        entity: String,
        /// Property name
        property: String,
        /// What was wrong
        reason: String,
    },

    /// Property or ownership edge name not declared on the entity
    #[error("Unknown property {property} on {entity}")]
    UnknownProperty {
        /// Entity name
        entity: String,
        /// Requested name
        property: String,
    },

    /// Object is not tracked by the unit of work and not in the store
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Store reported a failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Configuration errors are never retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::UnknownEntity { .. }
                | Error::CounterMissing { .. }
                | Error::CounterMisaligned { .. }
                | Error::IdSpaceExhausted { .. }
        )
    }

    /// Errors that abort the whole unit of work when raised during commit
    pub fn is_fatal_to_commit(&self) -> bool {
        matches!(
            self,
            Error::ConsistencyViolation { .. }
                | Error::AccessDenied { .. }
                | Error::BitemporalViolation { .. }
                | Error::Storage(_)
        )
    }

    /// Access-denied errors (authorization bugs rather than data bugs)
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied { .. })
    }

    /// The object this error is about, if any
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Error::LockConflict { object_id, .. }
            | Error::ConsistencyViolation { object_id, .. }
            | Error::AccessDenied { object_id, .. }
            | Error::BitemporalViolation { object_id, .. } => Some(*object_id),
            Error::ObjectNotFound(id) => Some(*id),
            _ => None,
        }
    }
}
