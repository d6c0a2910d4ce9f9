//! Audit trail records
//!
//! - CommitLogEntry: one row per committed unit of work
//! - AuditLogRow: one row per object touched by that unit of work
//!
//! Both are append-only: once written they are owned by the store and never
//! updated or deleted (the archival sweep that sets `is_archived` is external).

use crate::lock::AuditAction;
use crate::types::{EntityTag, ObjectId, Tid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commit log entry before the store assigns its Tid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommitLogEntry {
    /// Commit time (UTC)
    pub last_updated: DateTime<Utc>,
    /// Actor that committed the unit of work
    pub updated_by: Option<ObjectId>,
    /// Free-form comment
    pub comment: Option<String>,
    /// Correlates the commit with an external request
    pub correlation_id: Uuid,
}

impl NewCommitLogEntry {
    /// Attach the Tid assigned by the store
    pub fn with_tid(self, tid: Tid) -> CommitLogEntry {
        CommitLogEntry {
            tid,
            last_updated: self.last_updated,
            updated_by: self.updated_by,
            comment: self.comment,
            correlation_id: self.correlation_id,
        }
    }
}

/// One committed unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLogEntry {
    /// Identity assigned by the commit log
    pub tid: Tid,
    /// Commit time (UTC)
    pub last_updated: DateTime<Utc>,
    /// Actor that committed the unit of work
    pub updated_by: Option<ObjectId>,
    /// Free-form comment
    pub comment: Option<String>,
    /// Correlates the commit with an external request
    pub correlation_id: Uuid,
}

/// One audited object version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogRow {
    /// Commit that wrote the row
    pub tid: Tid,
    /// Audited object
    pub object_id: ObjectId,
    /// Aggregate root of the object
    pub root_object_id: ObjectId,
    /// Owning parent, None for roots
    pub parent_object_id: Option<ObjectId>,
    /// Entity type
    pub entity_tag: EntityTag,
    /// Business-effective date of this version
    pub valid_from: DateTime<Utc>,
    /// What happened
    pub action: AuditAction,
    /// Encoded delta (prior and new images)
    pub object_delta: Vec<u8>,
    /// Set by the archival sweep
    pub is_archived: bool,
}

/// Lookup key for the batched rollback query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditLookup {
    /// Object to look up
    pub object_id: ObjectId,
    /// Effective date the caller wants to see
    pub as_of: DateTime<Utc>,
}

impl AuditLogRow {
    /// Check whether this row is visible for a rollback lookup
    ///
    /// Rows whose valid-from is on or before `as_of` match, and Insert/Delete
    /// rows always match because they bound the object's lifetime.
    pub fn matches_lookup(&self, as_of: DateTime<Utc>) -> bool {
        self.valid_from <= as_of || self.action.bounds_lifetime()
    }
}
