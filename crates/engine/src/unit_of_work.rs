//! Unit of work
//!
//! A `UnitOfWork` is the single-threaded context of one business transaction.
//! It owns the tracked objects, the lock registry and the action log, and it
//! drives the lifecycle callbacks a host storage engine would emit:
//!
//! | Callback | Emitted by | Effect |
//! |---|---|---|
//! | `on_load` | `load` | track, queue rollback if newer than as-of |
//! | `on_save` | `flush` (new objects, save cascade) | record OnSave |
//! | `on_flush_dirty` | `flush` (modified objects) | record OnFlushDirty, or suppress |
//! | `on_delete` | `flush` (deleted objects) | record OnDelete |
//!
//! `commit` runs the final flush, validates, builds the delta trees and writes
//! everything in one physical transaction. `abort` (or dropping the unit of
//! work) discards it. In both cases the locks and the action log are cleared.

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use chronicle_concurrency::{ActionLog, ActionValidator, LockRegistry};
use chronicle_core::{
    EntityTag, Error, LifecycleAction, Lock, LockType, ObjectId, PersistentObject, Result, Value,
};

use crate::commit::CommitOutcome;
use crate::database::Chronicle;
use crate::rollback::{RollbackEngine, RollbackReport};
use crate::tracked::{ObjectArena, TrackedObject};

/// Truncate a timestamp to the precision kept by the store (microseconds)
pub(crate) fn store_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Per-unit-of-work settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOfWorkOptions {
    /// Effective date the unit of work sees and stamps
    pub as_of: DateTime<Utc>,
    /// Actor written to the commit log
    pub actor: Option<ObjectId>,
    /// Comment written to the commit log
    pub comment: Option<String>,
    /// Correlates the commit with an external request
    pub correlation_id: Uuid,
}

impl Default for UnitOfWorkOptions {
    fn default() -> Self {
        UnitOfWorkOptions {
            as_of: store_precision(Utc::now()),
            actor: None,
            comment: None,
            correlation_id: Uuid::new_v4(),
        }
    }
}

impl UnitOfWorkOptions {
    /// Options with the current time as as-of date
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the as-of date
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = store_precision(as_of);
        self
    }

    /// Set the actor
    pub fn with_actor(mut self, actor: ObjectId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Set the commit comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Context of one business transaction
pub struct UnitOfWork {
    pub(crate) chronicle: Chronicle,
    pub(crate) options: UnitOfWorkOptions,
    pub(crate) objects: ObjectArena,
    pub(crate) locks: LockRegistry,
    pub(crate) actions: ActionLog,
    pub(crate) validator: ActionValidator,
    /// Objects waiting for the next rollback pass
    pending_rollback: Vec<ObjectId>,
    finished: bool,
}

impl UnitOfWork {
    pub(crate) fn new(chronicle: Chronicle, options: UnitOfWorkOptions) -> Self {
        let validator = ActionValidator::new(chronicle.config().strict_update_locks);
        let mut uow = UnitOfWork {
            chronicle,
            options,
            objects: ObjectArena::new(),
            locks: LockRegistry::new(),
            actions: ActionLog::new(),
            validator,
            pending_rollback: Vec::new(),
            finished: false,
        };
        uow.after_transaction_begin();
        uow
    }

    /// Settings of this unit of work
    pub fn options(&self) -> &UnitOfWorkOptions {
        &self.options
    }

    /// Effective date of this unit of work
    pub fn as_of(&self) -> DateTime<Utc> {
        self.options.as_of
    }

    /// Locks declared so far
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Lifecycle actions recorded so far
    pub fn actions(&self) -> &ActionLog {
        &self.actions
    }

    // ========================================================================
    // Application API
    // ========================================================================

    /// Create a new aggregate root (or free-standing object)
    ///
    /// Allocates an id, tracks the object with every property `Null` and
    /// valid-from set to the as-of date, and declares an Insert lock.
    pub fn create(&mut self, tag: EntityTag) -> Result<ObjectId> {
        let descriptor = self.chronicle.registry().descriptor(tag)?;
        let id = self.chronicle.allocator().allocate(tag)?;
        let object = PersistentObject::new(id, descriptor, self.options.as_of);
        self.objects.insert(TrackedObject::created(object, true))?;
        self.locks.request_lock(id, LockType::Insert)?;
        trace!(target: "chronicle::commit", object_id = %id, "Object created");
        Ok(id)
    }

    /// Create a child owned by `parent` through `edge`
    ///
    /// The child gets no lock of its own: it is saved by the cascade from its
    /// parent, which declares an implicit Insert lock for it.
    pub fn create_owned(&mut self, parent: ObjectId, edge: &str) -> Result<ObjectId> {
        let registry = self.chronicle.registry();
        let parent_descriptor = registry.descriptor_for(parent)?;
        let edge_idx = parent_descriptor.edge_index(edge)?;
        let child_tag = parent_descriptor.ownership[edge_idx].child;
        let child_descriptor = registry.descriptor(child_tag)?;
        self.live(parent)?;

        let id = self.chronicle.allocator().allocate(child_tag)?;
        let mut child = PersistentObject::new(id, child_descriptor, self.options.as_of);
        child.parent = Some(parent);
        self.objects.insert(TrackedObject::created(child, false))?;
        self.objects.require_mut(parent)?.current.owned[edge_idx].push(id);
        trace!(target: "chronicle::commit", object_id = %id, %parent, edge, "Owned object created");
        Ok(id)
    }

    /// Make a tracked object a child of `parent` through `edge`
    pub fn attach_child(&mut self, parent: ObjectId, edge: &str, child: ObjectId) -> Result<()> {
        let parent_descriptor = self.chronicle.registry().descriptor_for(parent)?;
        let edge_idx = parent_descriptor.edge_index(edge)?;
        let expected = parent_descriptor.ownership[edge_idx].child;
        if child.entity_tag() != expected {
            return Err(Error::InvalidOperation(format!(
                "edge '{}' of '{}' owns {} objects, not {}",
                edge,
                parent_descriptor.name,
                self.chronicle.registry().name_of(expected),
                self.chronicle.registry().name_of(child.entity_tag())
            )));
        }
        self.live(parent)?;
        let current_parent = self.live(child)?.current.parent;
        match current_parent {
            Some(p) if p == parent => {}
            Some(p) => {
                return Err(Error::InvalidOperation(format!(
                    "object {} is already owned by {}",
                    child, p
                )))
            }
            None => self.objects.require_mut(child)?.current.parent = Some(parent),
        }

        let children = &mut self.objects.require_mut(parent)?.current.owned[edge_idx];
        if !children.contains(&child) {
            children.push(child);
        }
        Ok(())
    }

    /// Remove `child` from `parent`'s `edge`
    ///
    /// The child keeps its identity and can be attached elsewhere or deleted.
    pub fn detach_child(&mut self, parent: ObjectId, edge: &str, child: ObjectId) -> Result<()> {
        let edge_idx = self.chronicle.registry().descriptor_for(parent)?.edge_index(edge)?;
        let children = &mut live_mut(&mut self.objects, parent)?.current.owned[edge_idx];
        let Some(pos) = children.iter().position(|&c| c == child) else {
            return Err(Error::InvalidOperation(format!(
                "object {} is not owned by {} through '{}'",
                child, parent, edge
            )));
        };
        children.remove(pos);
        if let Some(tracked) = self.objects.get_mut(child) {
            tracked.current.parent = None;
        }
        Ok(())
    }

    /// Load a persisted object, rolling it back if it is newer than the as-of date
    ///
    /// Loading an object that is already tracked is a no-op.
    pub fn load(&mut self, id: ObjectId) -> Result<()> {
        if self.objects.contains(id) {
            return Ok(());
        }
        self.load_untracked(id)?;
        let report = self.rollback_events();
        match report.failures.into_iter().find(|(failed, _)| *failed == id) {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Load several objects with one rollback pass
    pub fn load_many(&mut self, ids: &[ObjectId]) -> Result<RollbackReport> {
        for &id in ids {
            if !self.objects.contains(id) {
                self.load_untracked(id)?;
            }
        }
        Ok(self.rollback_events())
    }

    /// Current state of a tracked, non-deleted object
    pub fn get(&self, id: ObjectId) -> Result<&PersistentObject> {
        Ok(&self.live(id)?.current)
    }

    /// One property of a tracked object
    pub fn property(&self, id: ObjectId, name: &str) -> Result<&Value> {
        let descriptor = self.chronicle.registry().descriptor_for(id)?;
        self.get(id)?.get(descriptor, name)
    }

    /// Children owned through one edge
    pub fn children(&self, id: ObjectId, edge: &str) -> Result<&[ObjectId]> {
        let descriptor = self.chronicle.registry().descriptor_for(id)?;
        self.get(id)?.children(descriptor, edge)
    }

    /// Set a property, checking its declared kind
    pub fn set(&mut self, id: ObjectId, name: &str, value: Value) -> Result<()> {
        let descriptor = self.chronicle.registry().descriptor_for(id)?;
        live_mut(&mut self.objects, id)?.current.set(descriptor, name, value)
    }

    /// Set the business-effective date of an object
    ///
    /// Only kept where the historization policy passes the caller's value
    /// through; otherwise the as-of date is stamped at commit.
    pub fn set_valid_from(&mut self, id: ObjectId, valid_from: DateTime<Utc>) -> Result<()> {
        live_mut(&mut self.objects, id)?.current.valid_from = store_precision(valid_from);
        Ok(())
    }

    /// Declare the intended mutation of an object
    pub fn lock(&mut self, id: ObjectId, lock_type: LockType) -> Result<Lock> {
        self.chronicle.registry().descriptor_for(id)?;
        self.locks.request_lock(id, lock_type)
    }

    /// Mark an object for deletion
    ///
    /// Deletion does not cascade: owned children are deleted individually.
    pub fn delete(&mut self, id: ObjectId) -> Result<()> {
        let tracked = live_mut(&mut self.objects, id)?;
        tracked.deleted = true;
        trace!(target: "chronicle::commit", object_id = %id, "Object marked for deletion");
        Ok(())
    }

    /// Check whether an object's state was replaced by a historical version
    pub fn is_rolled_back(&self, id: ObjectId) -> bool {
        self.objects.get(id).map(|t| t.rolled_back).unwrap_or(false)
    }

    /// Check whether an object is tracked and marked deleted
    pub fn is_deleted(&self, id: ObjectId) -> bool {
        self.objects.get(id).map(|t| t.deleted).unwrap_or(false)
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Report pending changes to the lock validator
    ///
    /// Emits, per tracked object in tracking order:
    /// - deleted objects: `on_delete` (preceded by `on_save` if never saved)
    /// - new objects: `on_save`, cascading to transient children
    /// - modified objects: `on_flush_dirty`
    ///
    /// and finally cascades saves from persisted parents to their transient
    /// children.
    pub fn flush(&mut self) -> Result<()> {
        for id in self.objects.ids() {
            let tracked = self.objects.require(id)?;
            let (deleted, delete_flushed, transient, save_requested, modified) = (
                tracked.deleted,
                tracked.delete_flushed,
                tracked.is_transient(),
                tracked.save_requested,
                tracked.is_modified(),
            );

            if deleted {
                if delete_flushed {
                    continue;
                }
                if transient {
                    if !save_requested {
                        self.objects.require_mut(id)?.delete_flushed = true;
                        continue;
                    }
                    self.on_save(id)?;
                }
                self.on_delete(id)?;
            } else if transient {
                if save_requested {
                    self.on_save(id)?;
                }
            } else if modified && self.on_flush_dirty(id)? {
                let tracked = self.objects.require_mut(id)?;
                tracked.flushed = Some(tracked.current.clone());
            }
        }

        for id in self.objects.ids() {
            let tracked = self.objects.require(id)?;
            if tracked.deleted || tracked.is_transient() {
                continue;
            }
            for child in self.transient_children(id) {
                self.cascade_save(child)?;
            }
        }
        Ok(())
    }

    fn transient_children(&self, id: ObjectId) -> Vec<ObjectId> {
        let Some(tracked) = self.objects.get(id) else {
            return Vec::new();
        };
        tracked
            .current
            .all_children()
            .filter(|&child| {
                self.objects
                    .get(child)
                    .is_some_and(|c| c.is_transient() && !c.deleted)
            })
            .collect()
    }

    fn cascade_save(&mut self, child: ObjectId) -> Result<()> {
        if self.locks.lock_discovered(child).is_some() {
            debug!(target: "chronicle::lock", object_id = %child, "Cascaded child locked for insert");
        }
        self.on_save(child)
    }

    // ========================================================================
    // Lifecycle callbacks
    // ========================================================================

    /// A persisted object was read
    pub fn on_load(&mut self, object: PersistentObject) -> Result<()> {
        let id = object.id;
        let newer = object.valid_from > self.options.as_of;
        self.objects.insert(TrackedObject::loaded(object))?;
        if newer {
            trace!(target: "chronicle::rollback", object_id = %id, "Loaded version is newer than as-of, rollback queued");
            self.pending_rollback.push(id);
        }
        Ok(())
    }

    /// A new object is about to be inserted
    ///
    /// # Errors
    /// `AccessDenied` if the object holds no lock.
    pub fn on_save(&mut self, id: ObjectId) -> Result<()> {
        if self.locks.find_lock(id).is_none() {
            return Err(self.denied(id, "saved without a lock"));
        }
        self.actions.record(id, LifecycleAction::OnSave);
        let tracked = self.objects.require_mut(id)?;
        tracked.flushed = Some(tracked.current.clone());

        for child in self.transient_children(id) {
            self.cascade_save(child)?;
        }
        Ok(())
    }

    /// A persisted object was found modified
    ///
    /// Returns false if the write must be suppressed because the object holds
    /// no lock; no action is recorded in that case.
    pub fn on_flush_dirty(&mut self, id: ObjectId) -> Result<bool> {
        if self.locks.find_lock(id).is_none() {
            warn!(
                target: "chronicle::lock",
                object_id = %id,
                entity = %self.chronicle.registry().name_of(id.entity_tag()),
                "Modified object holds no lock, write suppressed"
            );
            return Ok(false);
        }
        self.actions.record(id, LifecycleAction::OnFlushDirty);
        Ok(true)
    }

    /// An object is about to be deleted
    ///
    /// # Errors
    /// `AccessDenied` if the object holds no lock.
    pub fn on_delete(&mut self, id: ObjectId) -> Result<()> {
        if self.locks.find_lock(id).is_none() {
            return Err(self.denied(id, "deleted without a lock"));
        }
        self.actions.record(id, LifecycleAction::OnDelete);
        self.objects.require_mut(id)?.delete_flushed = true;
        Ok(())
    }

    pub(crate) fn after_transaction_begin(&mut self) {
        self.chronicle.coordinator().record_start();
        debug!(
            target: "chronicle::commit",
            correlation_id = %self.options.correlation_id,
            as_of = %self.options.as_of,
            "Unit of work started"
        );
    }

    pub(crate) fn after_transaction_completion(&mut self, committed: bool) {
        self.locks.clear();
        self.actions.clear();
        self.pending_rollback.clear();
        self.finished = true;
        if committed {
            self.chronicle.coordinator().record_commit();
        } else {
            self.chronicle.coordinator().record_abort();
        }
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Validate and write every change in one physical transaction
    ///
    /// # Errors
    /// - `AccessDenied` / `ConsistencyViolation` if an observed action does
    ///   not match its lock
    /// - `BitemporalViolation` if the as-of date precedes the stored
    ///   valid-from of a written root
    /// - storage errors; nothing is written in any error case
    pub fn commit(mut self) -> Result<CommitOutcome> {
        match self.before_transaction_completion() {
            Ok(outcome) => {
                self.after_transaction_completion(true);
                info!(
                    target: "chronicle::commit",
                    tid = ?outcome.tid,
                    correlation_id = %outcome.correlation_id,
                    trees = outcome.trees,
                    audit_rows = outcome.audit_rows,
                    "Unit of work committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    target: "chronicle::commit",
                    correlation_id = %self.options.correlation_id,
                    object_id = ?e.object_id(),
                    error = %e,
                    "Commit failed, unit of work aborted"
                );
                self.after_transaction_completion(false);
                Err(e)
            }
        }
    }

    /// Discard every change
    pub fn abort(mut self) {
        debug!(target: "chronicle::commit", correlation_id = %self.options.correlation_id, "Unit of work aborted");
        self.after_transaction_completion(false);
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Queue tracked objects for rollback to their as-of version
    pub fn request_rollback(&mut self, ids: &[ObjectId]) -> Result<()> {
        for &id in ids {
            self.objects.require(id)?;
            if !self.pending_rollback.contains(&id) {
                self.pending_rollback.push(id);
            }
        }
        Ok(())
    }

    /// Roll back every queued object
    pub fn rollback_events(&mut self) -> RollbackReport {
        if self.pending_rollback.is_empty() {
            return RollbackReport::default();
        }
        let pending = std::mem::take(&mut self.pending_rollback);
        let engine = RollbackEngine::new(
            self.chronicle.store(),
            self.chronicle.codecs(),
            self.chronicle.config().rollback_batch_size,
        );
        let report = engine.rollback_events(&mut self.objects, &pending, self.options.as_of);
        self.chronicle.coordinator().record_rollbacks(report.rolled_back.len());
        report
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn load_untracked(&mut self, id: ObjectId) -> Result<()> {
        let row = self
            .chronicle
            .store()
            .load_object(id)?
            .ok_or(Error::ObjectNotFound(id))?;
        let object = self.chronicle.codecs().decode_object(&row.payload)?;
        if object.id != id {
            return Err(Error::ConsistencyViolation {
                object_id: id,
                entity: self.chronicle.registry().name_of(id.entity_tag()),
                reason: format!("stored row holds object {}", object.id),
            });
        }
        self.on_load(object)
    }

    /// Load every untracked ancestor of a locked object
    pub(crate) fn load_missing_ancestors(&mut self) -> Result<()> {
        let locked: Vec<ObjectId> = self.locks.iter().map(|lock| lock.object_id).collect();
        for id in locked {
            let mut current = id;
            for _ in 0..=self.objects.len() {
                let Some(parent) = self.objects.get(current).and_then(TrackedObject::parent) else {
                    break;
                };
                if !self.objects.contains(parent) {
                    trace!(target: "chronicle::commit", object_id = %parent, "Loading ancestor of locked object");
                    self.load_untracked(parent)?;
                }
                current = parent;
            }
        }
        self.rollback_events();
        Ok(())
    }

    fn live(&self, id: ObjectId) -> Result<&TrackedObject> {
        match self.objects.get(id) {
            Some(tracked) if !tracked.deleted => Ok(tracked),
            _ => Err(Error::ObjectNotFound(id)),
        }
    }

    fn denied(&self, id: ObjectId, reason: &str) -> Error {
        Error::AccessDenied {
            object_id: id,
            entity: self.chronicle.registry().name_of(id.entity_tag()),
            reason: reason.to_string(),
        }
    }
}

/// Mutable access to a tracked, non-deleted object
///
/// Borrows only the arena so descriptors can stay borrowed from the handle.
fn live_mut(objects: &mut ObjectArena, id: ObjectId) -> Result<&mut TrackedObject> {
    match objects.get_mut(id) {
        Some(tracked) if !tracked.deleted => Ok(tracked),
        _ => Err(Error::ObjectNotFound(id)),
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.finished {
            debug!(target: "chronicle::commit", correlation_id = %self.options.correlation_id, "Unit of work dropped without commit");
            self.after_transaction_completion(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use chronicle_core::{EntityDescriptor, EntityRegistry, PropertyKind};
    use chronicle_storage::MemoryStore;

    use crate::database::ChronicleConfig;

    const ORDER: EntityTag = EntityTag(7);
    const LINE: EntityTag = EntityTag(8);

    fn chronicle() -> Chronicle {
        let registry = EntityRegistry::builder()
            .register(EntityDescriptor::new(ORDER, "Order").owns("lines", LINE))
            .register(EntityDescriptor::new(LINE, "OrderLine").property("qty", PropertyKind::Int))
            .build()
            .unwrap();
        let store = Arc::new(MemoryStore::with_counters(&registry));
        Chronicle::open(registry, store, ChronicleConfig::default()).unwrap()
    }

    fn options() -> UnitOfWorkOptions {
        UnitOfWorkOptions::new().with_as_of(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_create_owned_links_both_sides() {
        let chronicle = chronicle();
        let mut uow = chronicle.begin(options());
        let order = uow.create(ORDER).unwrap();
        let line = uow.create_owned(order, "lines").unwrap();

        assert_eq!(line.entity_tag(), LINE);
        assert_eq!(uow.get(line).unwrap().parent, Some(order));
        assert_eq!(uow.children(order, "lines").unwrap(), &[line]);
        assert!(uow.create_owned(order, "nope").is_err());
        uow.abort();
    }

    #[test]
    fn test_attach_checks_edge_type() {
        let chronicle = chronicle();
        let mut uow = chronicle.begin(options());
        let order = uow.create(ORDER).unwrap();
        let other = uow.create(ORDER).unwrap();
        let line = uow.create(LINE).unwrap();

        assert!(matches!(
            uow.attach_child(order, "lines", other),
            Err(Error::InvalidOperation(_))
        ));
        uow.attach_child(order, "lines", line).unwrap();
        // Attaching twice to the same parent is a no-op
        uow.attach_child(order, "lines", line).unwrap();
        assert_eq!(uow.children(order, "lines").unwrap().len(), 1);
        assert!(uow.attach_child(other, "lines", line).is_err());

        uow.detach_child(order, "lines", line).unwrap();
        assert!(uow.get(line).unwrap().parent.is_none());
        assert!(uow.detach_child(order, "lines", line).is_err());
        uow.abort();
    }

    #[test]
    fn test_set_checks_declared_kind() {
        let chronicle = chronicle();
        let mut uow = chronicle.begin(options());
        let line = uow.create(LINE).unwrap();

        uow.set(line, "qty", Value::Int(3)).unwrap();
        assert_eq!(uow.property(line, "qty").unwrap(), &Value::Int(3));
        assert!(matches!(
            uow.set(line, "qty", Value::Text("three".into())),
            Err(Error::TypeMismatch { .. })
        ));
        uow.abort();
    }

    #[test]
    fn test_transient_object_deleted_before_flush_is_never_saved() {
        let chronicle = chronicle();
        let mut uow = chronicle.begin(options());
        let order = uow.create(ORDER).unwrap();
        let line = uow.create_owned(order, "lines").unwrap();
        uow.detach_child(order, "lines", line).unwrap();
        uow.delete(line).unwrap();

        uow.flush().unwrap();
        assert!(uow.actions().actions(line).is_empty());
        assert!(uow.locks().find_lock(line).is_none());

        let outcome = uow.commit().unwrap();
        assert_eq!(outcome.audit_rows, 1);
    }

    #[test]
    fn test_store_precision_truncates_to_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap() + chrono::Duration::nanoseconds(1_999);
        assert_eq!(store_precision(ts).timestamp_subsec_nanos(), 1_000);
    }

    proptest::proptest! {
        #[test]
        fn test_store_precision_is_stable(secs in 0i64..4_000_000_000, nanos in 0u32..1_000_000_000) {
            let ts = DateTime::<Utc>::from_timestamp(secs, nanos).unwrap();
            let stored = store_precision(ts);
            proptest::prop_assert!(stored <= ts);
            proptest::prop_assert!(ts - stored < chrono::Duration::microseconds(1));
            proptest::prop_assert_eq!(store_precision(stored), stored);
            proptest::prop_assert_eq!(DateTime::<Utc>::from_timestamp_micros(stored.timestamp_micros()), Some(stored));
        }
    }
}
