//! Lock registry
//!
//! One registry per unit of work. It records, for every object the unit of
//! work intends to mutate, the kind of mutation declared. It is the source of
//! truth for "is this write authorized" and is discarded when the unit of
//! work completes.
//!
//! ## Lock Transitions
//!
//! | held \ requested | None | Insert | Update | Delete |
//! |---|---|---|---|---|
//! | (none)  | create | create | create | create |
//! | None    | keep   | replace | replace | replace |
//! | Insert  | conflict | keep | conflict | upgrade |
//! | Update  | conflict | conflict | keep | upgrade |
//! | Delete  | conflict | conflict | conflict | keep |

use rustc_hash::FxHashMap;
use tracing::trace;

use chronicle_core::{Error, Lock, LockType, ObjectId, Result};

/// Per-unit-of-work table of declared intents
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: FxHashMap<ObjectId, Lock>,
    /// Object ids in the order their first lock was requested
    order: Vec<ObjectId>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an intent for an object
    ///
    /// # Errors
    /// Returns `Error::LockConflict` if an incompatible lock is already held.
    pub fn request_lock(&mut self, object_id: ObjectId, lock_type: LockType) -> Result<Lock> {
        match self.locks.get_mut(&object_id) {
            None => {
                let lock = Lock::new(object_id, object_id.entity_tag(), lock_type);
                self.locks.insert(object_id, lock);
                self.order.push(object_id);
                trace!(target: "chronicle::lock", %object_id, ?lock_type, "Lock acquired");
                Ok(lock)
            }
            Some(existing) => {
                let held = existing.lock_type;
                let allowed = held == lock_type
                    || held == LockType::None
                    || (lock_type == LockType::Delete && matches!(held, LockType::Insert | LockType::Update));
                if !allowed {
                    return Err(Error::LockConflict {
                        object_id,
                        held,
                        requested: lock_type,
                    });
                }
                if held != lock_type {
                    trace!(target: "chronicle::lock", %object_id, ?held, ?lock_type, "Lock upgraded");
                    existing.lock_type = lock_type;
                }
                Ok(*existing)
            }
        }
    }

    /// Lock a child discovered during a save cascade
    ///
    /// Creates an Insert lock if the object holds no lock yet; an existing
    /// lock is left untouched. Returns the lock if one was created.
    pub fn lock_discovered(&mut self, object_id: ObjectId) -> Option<Lock> {
        if self.locks.contains_key(&object_id) {
            return None;
        }
        let lock = Lock::new(object_id, object_id.entity_tag(), LockType::Insert);
        self.locks.insert(object_id, lock);
        self.order.push(object_id);
        trace!(target: "chronicle::lock", %object_id, "Implicit insert lock for cascaded child");
        Some(lock)
    }

    /// Look up the lock of an object
    pub fn find_lock(&self, object_id: ObjectId) -> Option<&Lock> {
        self.locks.get(&object_id)
    }

    /// All locks, in request order
    pub fn iter(&self) -> impl Iterator<Item = &Lock> {
        self.order.iter().filter_map(move |id| self.locks.get(id))
    }

    /// Number of locks held
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no locks are held
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop every lock (end of the unit of work)
    pub fn clear(&mut self) {
        self.locks.clear();
        self.order.clear();
    }
}
