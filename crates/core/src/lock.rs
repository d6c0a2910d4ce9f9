//! Intent and action vocabulary
//!
//! - LockType / Lock: the mutation intent declared by application code
//! - LifecycleAction: a callback observed from the storage engine during flush
//! - AuditAction: the action recorded in an audit row

use crate::types::{EntityTag, ObjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation an object is authorized for in one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    /// Object is known, no mutation intended
    None,
    /// Object will be created
    Insert,
    /// Object will be modified
    Update,
    /// Object will be removed
    Delete,
}

impl LockType {
    /// Check whether this lock type permits the storage engine to emit `action`
    pub fn authorizes(&self, action: LifecycleAction) -> bool {
        use LifecycleAction::*;
        match self {
            LockType::Insert => matches!(action, OnSave | OnFlushDirty),
            LockType::Update => matches!(action, OnFlushDirty),
            LockType::Delete => true,
            LockType::None => matches!(action, OnSave | OnDelete),
        }
    }

    /// Audit action recorded for a dirty object holding this lock
    pub fn audit_action(&self) -> AuditAction {
        match self {
            LockType::Insert => AuditAction::Insert,
            LockType::Delete => AuditAction::Delete,
            LockType::Update | LockType::None => AuditAction::Update,
        }
    }
}

/// A declared mutation intent for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Locked object
    pub object_id: ObjectId,
    /// Entity type of the object
    pub entity_tag: EntityTag,
    /// Declared intent
    pub lock_type: LockType,
}

impl Lock {
    /// Create a lock
    pub fn new(object_id: ObjectId, entity_tag: EntityTag, lock_type: LockType) -> Self {
        Lock {
            object_id,
            entity_tag,
            lock_type,
        }
    }
}

/// Storage engine callback observed during a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleAction {
    /// Object is being inserted
    OnSave,
    /// Persisted object is being written with changed state
    OnFlushDirty,
    /// Object is being deleted
    OnDelete,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::OnSave => write!(f, "OnSave"),
            LifecycleAction::OnFlushDirty => write!(f, "OnFlushDirty"),
            LifecycleAction::OnDelete => write!(f, "OnDelete"),
        }
    }
}

/// Action recorded on an audit row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuditAction {
    /// Object created
    Insert = 1,
    /// Object (or one of its owned children) changed
    Update = 2,
    /// Object removed
    Delete = 3,
}

impl AuditAction {
    /// Convert to byte representation
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Try to create from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(AuditAction::Insert),
            2 => Some(AuditAction::Update),
            3 => Some(AuditAction::Delete),
            _ => None,
        }
    }

    /// Insert and Delete bound an object's lifetime
    pub fn bounds_lifetime(&self) -> bool {
        matches!(self, AuditAction::Insert | AuditAction::Delete)
    }
}
