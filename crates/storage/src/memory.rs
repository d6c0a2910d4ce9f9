//! MemoryStore: in-process implementation of the relational store
//!
//! Tables:
//! - `counters`: one identifier counter per entity tag
//! - `objects`: latest persisted row per object
//! - `commit_log`: committed units of work keyed by Tid
//! - `audit_log`: append-only audit rows, indexed by object
//!
//! # Design Notes
//!
//! - **One RwLock over all tables**: a physical transaction stages writes
//!   privately and applies them under a single write lock, so readers never
//!   observe half a commit.
//! - **Identity Tid**: taken from an `AtomicU64` when the commit log entry is
//!   staged. A rolled-back transaction burns its Tid, like an SQL identity column.
//! - **Autocommit counters**: counter statements apply immediately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use chronicle_core::{
    AuditLogRow, AuditLookup, CommitLogEntry, EntityRegistry, EntityTag, Error, NewCommitLogEntry,
    ObjectId, Result, Tid, RESERVATION_SIZE,
};

use crate::testing::{FailPoint, FailPoints, FailSite};
use crate::traits::{ObjectRow, ObjectWrite, Store, StoreTransaction};

#[derive(Debug, Default)]
struct Tables {
    counters: FxHashMap<EntityTag, u64>,
    objects: FxHashMap<ObjectId, ObjectRow>,
    commit_log: BTreeMap<Tid, CommitLogEntry>,
    audit_log: Vec<AuditLogRow>,
    /// ObjectId -> positions in `audit_log`, in insertion (Tid) order
    audit_by_object: FxHashMap<ObjectId, Vec<usize>>,
}

/// In-memory relational store
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_tid: AtomicU64,
    counter_updates: AtomicU64,
    fail_points: FailPoints,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with no counter rows
    pub fn new() -> Self {
        MemoryStore {
            tables: RwLock::new(Tables::default()),
            next_tid: AtomicU64::new(1),
            counter_updates: AtomicU64::new(0),
            fail_points: FailPoints::default(),
        }
    }

    /// Create a store with a zeroed counter row for every registered entity type
    pub fn with_counters(registry: &EntityRegistry) -> Self {
        let store = Self::new();
        for descriptor in registry.iter() {
            store.seed_counter(descriptor.tag, 0);
        }
        store
    }

    /// Insert or overwrite a counter row
    pub fn seed_counter(&self, tag: EntityTag, value: u64) {
        self.tables.write().counters.insert(tag, value);
    }

    /// Remove a counter row
    pub fn drop_counter(&self, tag: EntityTag) {
        self.tables.write().counters.remove(&tag);
    }

    /// Arm a fail point
    pub fn inject(&self, point: FailPoint) {
        self.fail_points.inject(point);
    }

    /// Disarm every fail point
    pub fn clear_fail_points(&self) {
        self.fail_points.clear();
    }

    /// Number of conditional counter updates issued so far
    pub fn counter_updates(&self) -> u64 {
        self.counter_updates.load(Ordering::SeqCst)
    }

    /// Number of committed commit log entries
    pub fn commit_log_len(&self) -> usize {
        self.tables.read().commit_log.len()
    }

    /// Number of committed audit rows
    pub fn audit_log_len(&self) -> usize {
        self.tables.read().audit_log.len()
    }

    /// Number of persisted object rows
    pub fn object_count(&self) -> usize {
        self.tables.read().objects.len()
    }

    /// Every audit row written by one commit
    pub fn audit_rows_for(&self, tid: Tid) -> Vec<AuditLogRow> {
        self.tables
            .read()
            .audit_log
            .iter()
            .filter(|row| row.tid == tid)
            .cloned()
            .collect()
    }
}

impl Store for MemoryStore {
    fn read_counter(&self, tag: EntityTag) -> Result<Option<u64>> {
        Ok(self.tables.read().counters.get(&tag).copied())
    }

    fn update_counter_if(&self, tag: EntityTag, expected: u64, new_value: u64) -> Result<u64> {
        self.counter_updates.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.write();
        let Some(current) = tables.counters.get_mut(&tag) else {
            return Ok(0);
        };
        if self.fail_points.take_contention() {
            // A competing allocator reserved the block between our read and update.
            *current += RESERVATION_SIZE;
            debug!(target: "chronicle::store", tag = %tag, "Simulated counter contention");
            return Ok(0);
        }
        if *current != expected {
            return Ok(0);
        }
        *current = new_value;
        Ok(1)
    }

    fn load_object(&self, id: ObjectId) -> Result<Option<ObjectRow>> {
        Ok(self.tables.read().objects.get(&id).cloned())
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            commit_entries: Vec::new(),
            object_writes: Vec::new(),
            audit_rows: Vec::new(),
            audit_keys: FxHashSet::default(),
            finished: false,
        }))
    }

    fn latest_audit_rows(&self, lookups: &[AuditLookup]) -> Result<Vec<AuditLogRow>> {
        // Temporary join set: ObjectId -> as-of
        let mut join: FxHashMap<ObjectId, AuditLookup> = FxHashMap::default();
        let mut order = Vec::with_capacity(lookups.len());
        for lookup in lookups {
            if join.insert(lookup.object_id, *lookup).is_none() {
                order.push(lookup.object_id);
            }
        }

        let tables = self.tables.read();
        let mut result = Vec::new();
        for object_id in order {
            let as_of = join[&object_id].as_of;
            let Some(positions) = tables.audit_by_object.get(&object_id) else {
                continue;
            };
            let latest = positions
                .iter()
                .map(|&pos| &tables.audit_log[pos])
                .filter(|row| row.matches_lookup(as_of))
                .max_by_key(|row| row.tid);
            if let Some(row) = latest {
                result.push(row.clone());
            }
        }
        Ok(result)
    }

    fn audit_history(&self, id: ObjectId) -> Result<Vec<AuditLogRow>> {
        let tables = self.tables.read();
        let mut rows: Vec<AuditLogRow> = tables
            .audit_by_object
            .get(&id)
            .map(|positions| positions.iter().map(|&pos| tables.audit_log[pos].clone()).collect())
            .unwrap_or_default();
        rows.sort_by_key(|row| row.tid);
        Ok(rows)
    }

    fn commit_log_entry(&self, tid: Tid) -> Result<Option<CommitLogEntry>> {
        Ok(self.tables.read().commit_log.get(&tid).cloned())
    }
}

/// Physical transaction over a `MemoryStore`
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    commit_entries: Vec<CommitLogEntry>,
    object_writes: Vec<ObjectWrite>,
    audit_rows: Vec<AuditLogRow>,
    /// Composite primary key (Tid, ObjectId) of staged audit rows
    audit_keys: FxHashSet<(Tid, ObjectId)>,
    finished: bool,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn insert_commit_log(&mut self, entry: NewCommitLogEntry) -> Result<Tid> {
        self.store.fail_points.check(FailSite::CommitLogInsert)?;
        let tid = Tid(self.store.next_tid.fetch_add(1, Ordering::SeqCst));
        self.commit_entries.push(entry.with_tid(tid));
        Ok(tid)
    }

    fn write_object(&mut self, write: ObjectWrite) -> Result<()> {
        self.store
            .fail_points
            .check(FailSite::ObjectWrite(write.object_id()))?;
        self.object_writes.push(write);
        Ok(())
    }

    fn insert_audit_rows(&mut self, rows: &[AuditLogRow]) -> Result<usize> {
        self.store.fail_points.check(FailSite::AuditInsert)?;
        for row in rows {
            if !self.commit_entries.iter().any(|e| e.tid == row.tid) {
                return Err(Error::Storage(format!(
                    "audit row for {} references {} which is not part of this transaction",
                    row.object_id, row.tid
                )));
            }
            if !self.audit_keys.insert((row.tid, row.object_id)) {
                return Err(Error::Storage(format!(
                    "duplicate audit row key ({}, {})",
                    row.tid, row.object_id
                )));
            }
        }
        self.audit_rows.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.store.fail_points.check(FailSite::Commit)?;

        let mut tables = self.store.tables.write();
        for entry in self.commit_entries.drain(..) {
            tables.commit_log.insert(entry.tid, entry);
        }
        for write in self.object_writes.drain(..) {
            match write {
                ObjectWrite::Upsert(row) => {
                    tables.objects.insert(row.object_id, row);
                }
                ObjectWrite::Delete(id) => {
                    tables.objects.remove(&id);
                }
            }
        }
        for row in self.audit_rows.drain(..) {
            let pos = tables.audit_log.len();
            tables.audit_by_object.entry(row.object_id).or_default().push(pos);
            tables.audit_log.push(row);
        }
        self.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                target: "chronicle::store",
                commit_entries = self.commit_entries.len(),
                object_writes = self.object_writes.len(),
                audit_rows = self.audit_rows.len(),
                "Physical transaction rolled back"
            );
        }
    }
}
