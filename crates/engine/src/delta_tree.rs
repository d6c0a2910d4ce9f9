//! Delta tree builder
//!
//! Groups the locked objects of a unit of work by aggregate and builds one
//! [`DeltaTree`] per aggregate:
//!
//! 1. resolve every locked object to its root by walking parent pointers,
//!    bounded by the number of tracked objects
//! 2. build one tree per distinct root, following only the ownership edges
//!    declared on each entity descriptor
//! 3. give every locked object not reached from its root a tree of its own,
//!    still labelled with the resolved root
//! 4. propagate dirtiness upward and spread the rolled-back tag
//! 5. compute the aggregate valid-from and assign it to every node
//!
//! Only tracked objects become nodes: an untracked child cannot have changed.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use chronicle_concurrency::LockRegistry;
use chronicle_core::{AuditAction, EntityRegistry, Error, ObjectId, Result};
use chronicle_durability::{DeltaNode, DeltaTree};

use crate::bitemporal::{aggregate_valid_from, check_inception};
use crate::tracked::{ObjectArena, TrackedObject};

/// Builds the delta trees of one commit
pub struct DeltaTreeBuilder<'a> {
    registry: &'a EntityRegistry,
    objects: &'a ObjectArena,
    locks: &'a LockRegistry,
    dirty: &'a FxHashSet<ObjectId>,
    as_of: DateTime<Utc>,
}

impl<'a> DeltaTreeBuilder<'a> {
    /// Create a builder over the state of a unit of work
    pub fn new(
        registry: &'a EntityRegistry,
        objects: &'a ObjectArena,
        locks: &'a LockRegistry,
        dirty: &'a FxHashSet<ObjectId>,
        as_of: DateTime<Utc>,
    ) -> Self {
        DeltaTreeBuilder {
            registry,
            objects,
            locks,
            dirty,
            as_of,
        }
    }

    /// Build every tree, in the order roots were first locked
    ///
    /// # Errors
    /// - `ConsistencyViolation` if parent pointers form a cycle
    /// - `BitemporalViolation` if the as-of date precedes a written root's stored valid-from
    pub fn build(&self) -> Result<Vec<DeltaTree>> {
        let mut roots: Vec<ObjectId> = Vec::new();
        let mut root_of: FxHashMap<ObjectId, ObjectId> = FxHashMap::default();
        for lock in self.locks.iter() {
            if !self.objects.contains(lock.object_id) {
                continue;
            }
            let root = self.resolve_root(lock.object_id)?;
            if !roots.contains(&root) {
                roots.push(root);
            }
            root_of.insert(lock.object_id, root);
        }

        let mut visited: FxHashSet<ObjectId> = FxHashSet::default();
        let mut trees = Vec::with_capacity(roots.len());
        for &root in &roots {
            trees.push(self.build_tree(root, root, &mut visited)?);
        }

        for lock in self.locks.iter() {
            if visited.contains(&lock.object_id) {
                continue;
            }
            if let Some(&root) = root_of.get(&lock.object_id) {
                trace!(target: "chronicle::commit", object_id = %lock.object_id, %root, "Detached object gets its own tree");
                trees.push(self.build_tree(lock.object_id, root, &mut visited)?);
            }
        }

        for tree in &mut trees {
            tree.propagate_dirty();
            tree.spread_rolled_back();
            self.assign_valid_from(tree)?;
        }
        Ok(trees)
    }

    /// Walk parent pointers up to the topmost tracked ancestor
    fn resolve_root(&self, object_id: ObjectId) -> Result<ObjectId> {
        let mut current = object_id;
        for _ in 0..=self.objects.len() {
            let parent = self.objects.get(current).and_then(TrackedObject::parent);
            match parent {
                Some(parent) if self.objects.contains(parent) => current = parent,
                _ => return Ok(current),
            }
        }
        Err(Error::ConsistencyViolation {
            object_id,
            entity: self.registry.name_of(object_id.entity_tag()),
            reason: "parent pointers form a cycle".to_string(),
        })
    }

    fn build_tree(&self, top: ObjectId, root: ObjectId, visited: &mut FxHashSet<ObjectId>) -> Result<DeltaTree> {
        let mut tree = DeltaTree::new(self.node(top, root)?);
        visited.insert(top);

        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let object_id = tree.node(idx).object_id;
            let tracked = self.objects.require(object_id)?;
            let descriptor = self.registry.descriptor_for(object_id)?;

            for (edge, children) in descriptor.ownership.iter().zip(&tracked.current.owned) {
                for &child in children {
                    if child.entity_tag() != edge.child || visited.contains(&child) || !self.objects.contains(child) {
                        continue;
                    }
                    if let Some(child_idx) = tree.push_child(idx, self.node(child, root)?) {
                        visited.insert(child);
                        stack.push(child_idx);
                    }
                }
            }
        }
        Ok(tree)
    }

    fn node(&self, object_id: ObjectId, root: ObjectId) -> Result<DeltaNode> {
        let tracked = self.objects.require(object_id)?;
        let declared = self
            .locks
            .find_lock(object_id)
            .map(|lock| lock.lock_type.audit_action())
            .unwrap_or(AuditAction::Update);
        // A delete lock only authorizes removal; the object goes only if it was deleted
        let undeleted = declared == AuditAction::Delete && !tracked.deleted;
        let action = if undeleted { AuditAction::Update } else { declared };
        Ok(DeltaNode {
            object_id,
            parent_object_id: tracked.parent(),
            root_object_id: root,
            entity_tag: object_id.entity_tag(),
            is_dirty: self.dirty.contains(&object_id) && !undeleted,
            child_is_dirty: false,
            rolled_back: tracked.rolled_back,
            valid_from: tracked.current.valid_from,
            children: Vec::new(),
            action,
            prior_state: tracked.original.clone(),
            new_state: if tracked.deleted {
                None
            } else {
                Some(tracked.current.clone())
            },
        })
    }

    fn assign_valid_from(&self, tree: &mut DeltaTree) -> Result<()> {
        let root_id = tree.root_object_id();
        let root = self.objects.require(root_id)?;
        let descriptor = self.registry.descriptor_for(root_id)?;

        let valid_from = aggregate_valid_from(descriptor, root.is_new(), root.current.valid_from, self.as_of);
        if tree.has_rows() {
            if let Some(stored) = root.original.as_ref() {
                check_inception(root_id, descriptor, self.as_of, stored.valid_from)?;
            }
        }
        trace!(target: "chronicle::commit", root = %root_id, valid_from = %valid_from.value, stamped = valid_from.stamped, "Aggregate valid-from assigned");

        for node in tree.nodes_mut() {
            node.valid_from = valid_from.value;
            if node.is_dirty {
                if let Some(state) = node.new_state.as_mut() {
                    state.valid_from = valid_from.value;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{EntityDescriptor, EntityTag, HistorizationPolicy, LockType, PersistentObject};
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn registry(policy: HistorizationPolicy) -> EntityRegistry {
        EntityRegistry::builder()
            .register(EntityDescriptor::new(EntityTag(7), "Order").owns("lines", EntityTag(8)).policy(policy))
            .register(EntityDescriptor::new(EntityTag(8), "OrderLine").owns("subs", EntityTag(9)))
            .register(EntityDescriptor::new(EntityTag(9), "SubLine"))
            .build()
            .unwrap()
    }

    fn oid(tag: u16, lo: u8) -> ObjectId {
        ObjectId::from_parts(EntityTag(tag), 0, lo).unwrap()
    }

    struct Fixture {
        registry: EntityRegistry,
        objects: ObjectArena,
        locks: LockRegistry,
        dirty: FxHashSet<ObjectId>,
    }

    impl Fixture {
        /// order(7,1) -> line(8,1) -> sub(9,1); order -> line(8,2); all persisted
        fn new(policy: HistorizationPolicy) -> Self {
            let registry = registry(policy);
            let mut objects = ObjectArena::new();
            let make = |id: ObjectId, parent: Option<ObjectId>, children: Vec<ObjectId>| {
                let mut obj = PersistentObject::new(id, registry.descriptor_for(id).unwrap(), day(1));
                obj.parent = parent;
                if !obj.owned.is_empty() {
                    obj.owned[0] = children;
                }
                TrackedObject::loaded(obj)
            };
            objects
                .insert(make(oid(7, 1), None, vec![oid(8, 1), oid(8, 2)]))
                .unwrap();
            objects.insert(make(oid(8, 1), Some(oid(7, 1)), vec![oid(9, 1)])).unwrap();
            objects.insert(make(oid(8, 2), Some(oid(7, 1)), vec![])).unwrap();
            objects.insert(make(oid(9, 1), Some(oid(8, 1)), vec![])).unwrap();
            Fixture {
                registry,
                objects,
                locks: LockRegistry::new(),
                dirty: FxHashSet::default(),
            }
        }

        fn dirty(&mut self, id: ObjectId, lock_type: LockType) {
            self.locks.request_lock(id, lock_type).unwrap();
            self.dirty.insert(id);
        }

        /// Pretend `id` was stored with `valid_from`
        fn stored_at(&mut self, id: ObjectId, valid_from: DateTime<Utc>) {
            let tracked = self.objects.get_mut(id).unwrap();
            tracked.current.valid_from = valid_from;
            if let Some(original) = tracked.original.as_mut() {
                original.valid_from = valid_from;
            }
        }

        fn build(&self, as_of: DateTime<Utc>) -> Result<Vec<DeltaTree>> {
            DeltaTreeBuilder::new(&self.registry, &self.objects, &self.locks, &self.dirty, as_of).build()
        }
    }

    #[test]
    fn test_dirty_leaf_builds_whole_aggregate() {
        let mut f = Fixture::new(HistorizationPolicy::All);
        f.dirty(oid(9, 1), LockType::Update);

        let trees = f.build(day(5)).unwrap();
        assert_eq!(trees.len(), 1);
        let tree = &trees[0];
        assert_eq!(tree.root_object_id(), oid(7, 1));
        assert_eq!(tree.len(), 4);
        assert!(tree.get(oid(7, 1)).unwrap().child_is_dirty);
        assert!(tree.get(oid(8, 1)).unwrap().child_is_dirty);
        assert!(!tree.get(oid(8, 2)).unwrap().needs_row());
        assert!(tree.nodes().iter().all(|n| n.valid_from == day(5)));
        assert_eq!(tree.get(oid(9, 1)).unwrap().new_state.as_ref().unwrap().valid_from, day(5));
        // Ancestor-only nodes keep their in-memory image valid-from
        assert_eq!(tree.get(oid(7, 1)).unwrap().new_state.as_ref().unwrap().valid_from, day(1));
    }

    #[test]
    fn test_one_tree_per_root() {
        let mut f = Fixture::new(HistorizationPolicy::All);
        f.dirty(oid(9, 1), LockType::Update);
        f.dirty(oid(8, 2), LockType::Update);
        assert_eq!(f.build(day(5)).unwrap().len(), 1);
    }

    #[test]
    fn test_detached_object_gets_its_own_tree() {
        let mut f = Fixture::new(HistorizationPolicy::All);
        // Remove line(8,2) from the order's list, keeping its parent pointer
        f.objects.get_mut(oid(7, 1)).unwrap().current.owned[0] = vec![oid(8, 1)];
        f.objects.get_mut(oid(8, 2)).unwrap().deleted = true;
        f.dirty(oid(8, 2), LockType::Delete);

        let trees = f.build(day(5)).unwrap();
        assert_eq!(trees.len(), 2);
        let detached = &trees[1];
        assert_eq!(detached.top().object_id, oid(8, 2));
        assert_eq!(detached.root_object_id(), oid(7, 1));
        assert_eq!(detached.top().action, AuditAction::Delete);
        assert!(detached.top().new_state.is_none());
        assert!(!trees[0].has_rows());
    }

    #[test]
    fn test_delete_lock_without_delete_keeps_the_object() {
        let mut f = Fixture::new(HistorizationPolicy::All);
        f.dirty(oid(8, 2), LockType::Delete);

        let trees = f.build(day(5)).unwrap();
        let line = trees[0].get(oid(8, 2)).unwrap();
        assert_eq!(line.action, AuditAction::Update);
        assert!(!line.is_dirty);
        assert!(line.new_state.is_some());
        assert!(!trees[0].has_rows());
    }

    #[test]
    fn test_child_listed_twice_is_visited_once() {
        let mut f = Fixture::new(HistorizationPolicy::None);
        f.objects.get_mut(oid(8, 1)).unwrap().current.owned[0].push(oid(9, 1));
        f.dirty(oid(8, 1), LockType::Update);
        let trees = f.build(day(5)).unwrap();
        assert_eq!(trees[0].len(), 4);
    }

    #[test]
    fn test_cycle_in_parent_pointers_is_rejected() {
        let mut f = Fixture::new(HistorizationPolicy::None);
        f.objects.get_mut(oid(7, 1)).unwrap().current.parent = Some(oid(9, 1));
        f.dirty(oid(9, 1), LockType::Update);
        assert!(matches!(f.build(day(5)), Err(Error::ConsistencyViolation { .. })));
    }

    #[test]
    fn test_rolled_back_tag_spreads() {
        let mut f = Fixture::new(HistorizationPolicy::None);
        f.objects.get_mut(oid(8, 2)).unwrap().rolled_back = true;
        f.dirty(oid(9, 1), LockType::Update);
        let trees = f.build(day(5)).unwrap();
        assert!(trees[0].nodes().iter().all(|n| n.rolled_back));
    }

    #[test]
    fn test_bitemporal_violation() {
        let mut f = Fixture::new(HistorizationPolicy::All);
        f.stored_at(oid(7, 1), day(20));
        f.dirty(oid(9, 1), LockType::Update);
        let err = f.build(day(5)).unwrap_err();
        assert!(matches!(err, Error::BitemporalViolation { object_id, .. } if object_id == oid(7, 1)));
    }

    #[test]
    fn test_clean_aggregate_is_not_checked() {
        let mut f = Fixture::new(HistorizationPolicy::All);
        f.stored_at(oid(7, 1), day(20));
        f.locks.request_lock(oid(9, 1), LockType::Update).unwrap();
        let trees = f.build(day(5)).unwrap();
        assert!(!trees[0].has_rows());
    }

    #[test]
    fn test_policy_none_passes_caller_value() {
        let mut f = Fixture::new(HistorizationPolicy::None);
        f.objects.get_mut(oid(7, 1)).unwrap().current.valid_from = day(3);
        f.dirty(oid(9, 1), LockType::Update);
        let trees = f.build(day(5)).unwrap();
        assert!(trees[0].nodes().iter().all(|n| n.valid_from == day(3)));
    }

    #[test]
    fn test_policy_none_still_rejects_as_of_before_inception() {
        let mut f = Fixture::new(HistorizationPolicy::None);
        f.stored_at(oid(7, 1), day(20));
        f.dirty(oid(9, 1), LockType::Update);
        let err = f.build(day(5)).unwrap_err();
        assert!(matches!(err, Error::BitemporalViolation { object_id, .. } if object_id == oid(7, 1)));
    }
}
