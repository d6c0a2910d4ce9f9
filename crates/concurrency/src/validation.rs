//! Lock-vs-action validation
//!
//! During flush the storage engine reports lifecycle callbacks per object.
//! They are buffered in an [`ActionLog`]; just before commit every lock is
//! checked against the actions recorded for its object.
//!
//! ## Validation Table
//!
//! | LockType | Valid sequences | Dirty |
//! |---|---|---|
//! | Insert | `[OnSave]`, `[OnSave, OnFlushDirty, …]` | iff valid |
//! | Update | `[]`, `[OnFlushDirty]` | iff exactly one OnFlushDirty |
//! | Delete | `[]`, `[OnDelete]`, `[OnSave, OnDelete]`, `[OnFlushDirty, OnDelete]` | iff valid |
//! | None | `[OnSave, OnDelete]` | iff the sequence does NOT match |
//!
//! Any other sequence aborts the commit. If an observed action is one the lock
//! type never authorizes, the violation is access-denied; otherwise the
//! actions were of permitted kinds in an impossible shape, which is a
//! consistency violation.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::warn;

use chronicle_core::{EntityRegistry, Error, LifecycleAction, LockType, ObjectId, Result};

use crate::lock::LockRegistry;

/// Recorded actions of one object, in callback order
pub type ActionSequence = SmallVec<[LifecycleAction; 4]>;

/// Per-unit-of-work buffer of observed lifecycle callbacks
#[derive(Debug, Default)]
pub struct ActionLog {
    records: FxHashMap<ObjectId, ActionSequence>,
    order: Vec<ObjectId>,
}

impl ActionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observed action
    pub fn record(&mut self, object_id: ObjectId, action: LifecycleAction) {
        let seq = self.records.entry(object_id).or_insert_with(|| {
            self.order.push(object_id);
            SmallVec::new()
        });
        seq.push(action);
    }

    /// Actions recorded for an object (empty if none)
    pub fn actions(&self, object_id: ObjectId) -> &[LifecycleAction] {
        self.records.get(&object_id).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Check if any action was recorded for an object
    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.records.contains_key(&object_id)
    }

    /// Objects with recorded actions, in first-seen order
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.order.iter().copied()
    }

    /// Number of objects with recorded actions
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record (after commit validation)
    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}

/// Outcome of validating one lock against its actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    /// Sequence is permitted for the lock type
    pub is_valid: bool,
    /// Object must be written and audited
    pub is_dirty: bool,
}

impl Validation {
    const fn new(is_valid: bool, is_dirty: bool) -> Self {
        Validation { is_valid, is_dirty }
    }
}

/// Validate an action sequence against a lock type
pub fn validate(lock_type: LockType, actions: &[LifecycleAction]) -> Validation {
    use LifecycleAction::*;
    match lock_type {
        LockType::Insert => {
            let valid = matches!(actions, [OnSave, rest @ ..] if rest.iter().all(|a| *a == OnFlushDirty));
            Validation::new(valid, valid)
        }
        LockType::Update => match actions {
            [] => Validation::new(true, false),
            [OnFlushDirty] => Validation::new(true, true),
            _ => Validation::new(false, false),
        },
        LockType::Delete => {
            let valid = matches!(
                actions,
                [] | [OnDelete] | [OnSave, OnDelete] | [OnFlushDirty, OnDelete]
            );
            Validation::new(valid, valid)
        }
        LockType::None => {
            let valid = matches!(actions, [OnSave, OnDelete]);
            Validation::new(valid, !valid)
        }
    }
}

/// A lock whose recorded actions failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionViolation {
    /// Action recorded for an object that holds no lock
    Unlocked {
        /// Offending object
        object_id: ObjectId,
        /// Recorded actions
        actions: Vec<LifecycleAction>,
    },
    /// Lock type never authorizes one of the recorded actions
    Unauthorized {
        /// Offending object
        object_id: ObjectId,
        /// Declared intent
        lock_type: LockType,
        /// Recorded actions
        actions: Vec<LifecycleAction>,
    },
    /// Permitted action kinds in a sequence the table does not allow
    Malformed {
        /// Offending object
        object_id: ObjectId,
        /// Declared intent
        lock_type: LockType,
        /// Recorded actions
        actions: Vec<LifecycleAction>,
    },
}

impl ActionViolation {
    fn object_id(&self) -> ObjectId {
        match self {
            ActionViolation::Unlocked { object_id, .. }
            | ActionViolation::Unauthorized { object_id, .. }
            | ActionViolation::Malformed { object_id, .. } => *object_id,
        }
    }

    fn is_access_denied(&self) -> bool {
        !matches!(self, ActionViolation::Malformed { .. })
    }

    /// Convert into the error surfaced to the caller
    pub fn into_error(self, registry: &EntityRegistry) -> Error {
        let entity = registry.name_of(self.object_id().entity_tag());
        match self {
            ActionViolation::Unlocked { object_id, actions } => Error::AccessDenied {
                object_id,
                entity,
                reason: format!("{} observed without a lock", format_actions(&actions)),
            },
            ActionViolation::Unauthorized {
                object_id,
                lock_type,
                actions,
            } => Error::AccessDenied {
                object_id,
                entity,
                reason: format!("{:?} lock does not authorize {}", lock_type, format_actions(&actions)),
            },
            ActionViolation::Malformed {
                object_id,
                lock_type,
                actions,
            } => Error::ConsistencyViolation {
                object_id,
                entity,
                reason: format!("{} is not a valid sequence for a {:?} lock", format_actions(&actions), lock_type),
            },
        }
    }
}

fn format_actions(actions: &[LifecycleAction]) -> String {
    let names: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
    format!("[{}]", names.join(", "))
}

/// Result of validating a whole unit of work
///
/// Accumulates all violations found. The unit of work commits only if
/// `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All violations detected
    pub violations: Vec<ActionViolation>,
    /// Objects that must be written and audited
    pub dirty: FxHashSet<ObjectId>,
}

impl ValidationResult {
    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Check if an object was found dirty
    pub fn is_dirty(&self, object_id: ObjectId) -> bool {
        self.dirty.contains(&object_id)
    }

    /// Turn the result into the error for the first violation
    ///
    /// Access-denied violations are reported before consistency violations so
    /// an authorization problem is never reported as a data problem.
    pub fn into_result(mut self, registry: &EntityRegistry) -> Result<FxHashSet<ObjectId>> {
        if self.violations.is_empty() {
            return Ok(self.dirty);
        }
        let first = self
            .violations
            .iter()
            .position(ActionViolation::is_access_denied)
            .unwrap_or(0);
        Err(self.violations.swap_remove(first).into_error(registry))
    }
}

/// Cross-checks declared locks against observed actions
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionValidator {
    /// Reject Update locks with no recorded write
    pub strict_update_locks: bool,
}

impl ActionValidator {
    /// Create a validator
    pub fn new(strict_update_locks: bool) -> Self {
        ActionValidator { strict_update_locks }
    }

    /// Validate every lock of a unit of work
    pub fn check(&self, locks: &LockRegistry, log: &ActionLog) -> ValidationResult {
        let mut result = ValidationResult::default();

        for object_id in log.objects() {
            if locks.find_lock(object_id).is_none() {
                result.violations.push(ActionViolation::Unlocked {
                    object_id,
                    actions: log.actions(object_id).to_vec(),
                });
            }
        }

        for lock in locks.iter() {
            let actions = log.actions(lock.object_id);
            let outcome = validate(lock.lock_type, actions);
            let empty_update = self.strict_update_locks && lock.lock_type == LockType::Update && actions.is_empty();

            if outcome.is_valid && !empty_update {
                if outcome.is_dirty {
                    result.dirty.insert(lock.object_id);
                }
                continue;
            }

            let unauthorized = actions.iter().any(|a| !lock.lock_type.authorizes(*a));
            let violation = if unauthorized {
                ActionViolation::Unauthorized {
                    object_id: lock.object_id,
                    lock_type: lock.lock_type,
                    actions: actions.to_vec(),
                }
            } else {
                ActionViolation::Malformed {
                    object_id: lock.object_id,
                    lock_type: lock.lock_type,
                    actions: actions.to_vec(),
                }
            };
            result.violations.push(violation);
        }

        for violation in &result.violations {
            warn!(target: "chronicle::lock", ?violation, "Lock validation failed");
        }
        result
    }
}
