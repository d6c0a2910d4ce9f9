//! Relational store seam
//!
//! The engine talks to the relational store only through these traits. A
//! production deployment backs them with parameterized SQL; `MemoryStore`
//! backs them in-process.
//!
//! ## Statements
//!
//! | Method | SQL shape |
//! |---|---|
//! | `read_counter` | `SELECT NextHi FROM Counter WHERE Tag = ?` |
//! | `update_counter_if` | `UPDATE Counter SET NextHi = ? WHERE Tag = ? AND NextHi = ?` |
//! | `insert_commit_log` | `INSERT INTO CommitLog … ; SELECT SCOPE_IDENTITY()` |
//! | `insert_audit_rows` | batched `INSERT INTO AuditLog …` |
//! | `latest_audit_rows` | `AuditLog` joined against a temporary id set |
//!
//! Counter statements are autocommit. Everything written through a
//! `StoreTransaction` becomes visible atomically on `commit`, or not at all.

use chronicle_core::{
    AuditLogRow, AuditLookup, CommitLogEntry, EntityTag, NewCommitLogEntry, ObjectId, Result, Tid,
};
use chrono::{DateTime, Utc};

/// Persisted state of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    /// Object identity
    pub object_id: ObjectId,
    /// Entity type
    pub entity_tag: EntityTag,
    /// Business-effective date of the stored version
    pub valid_from: DateTime<Utc>,
    /// Codec-encoded object image
    pub payload: Vec<u8>,
}

/// One object write inside a physical transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectWrite {
    /// Insert or replace the object row
    Upsert(ObjectRow),
    /// Remove the object row
    Delete(ObjectId),
}

impl ObjectWrite {
    /// Object targeted by this write
    pub fn object_id(&self) -> ObjectId {
        match self {
            ObjectWrite::Upsert(row) => row.object_id,
            ObjectWrite::Delete(id) => *id,
        }
    }
}

/// Relational store used by the allocator, the commit path and the rollback path
pub trait Store: Send + Sync {
    /// Read the identifier counter of an entity type
    ///
    /// Returns None if the counter row does not exist.
    fn read_counter(&self, tag: EntityTag) -> Result<Option<u64>>;

    /// Conditionally update the identifier counter
    ///
    /// Sets the counter to `new_value` only if it currently holds `expected`.
    /// Returns the number of rows affected (0 or 1).
    fn update_counter_if(&self, tag: EntityTag, expected: u64, new_value: u64) -> Result<u64>;

    /// Load the persisted row of an object
    fn load_object(&self, id: ObjectId) -> Result<Option<ObjectRow>>;

    /// Begin a physical transaction
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>>;

    /// For each lookup, the most recent audit row visible at its as-of date
    ///
    /// A row is visible if its valid-from is on or before the as-of date, or if
    /// it is an Insert/Delete row. "Most recent" means highest Tid. Objects with
    /// no visible row are absent from the result.
    fn latest_audit_rows(&self, lookups: &[AuditLookup]) -> Result<Vec<AuditLogRow>>;

    /// Every audit row of an object, ordered by Tid
    fn audit_history(&self, id: ObjectId) -> Result<Vec<AuditLogRow>>;

    /// Commit log entry by Tid
    fn commit_log_entry(&self, tid: Tid) -> Result<Option<CommitLogEntry>>;
}

/// Physical transaction
///
/// Dropping a transaction without calling `commit` rolls it back.
pub trait StoreTransaction {
    /// Insert the commit log entry and return its identity
    fn insert_commit_log(&mut self, entry: NewCommitLogEntry) -> Result<Tid>;

    /// Write one object row
    fn write_object(&mut self, write: ObjectWrite) -> Result<()>;

    /// Insert one batch of audit rows; returns the number of rows inserted
    fn insert_audit_rows(&mut self, rows: &[AuditLogRow]) -> Result<usize>;

    /// Make every staged write visible atomically
    fn commit(self: Box<Self>) -> Result<()>;
}
