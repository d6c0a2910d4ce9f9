//! Objects tracked by one unit of work
//!
//! Each tracked object keeps three images:
//! - `current`: what application code sees and edits
//! - `flushed`: state at the last flush (the dirty-checking baseline);
//!   None while the object is transient
//! - `original`: state before this unit of work touched it (the prior image
//!   of its delta); None for objects created in this unit of work
//!
//! Rollback replaces `current` and resets both `flushed` and `original` to the
//! replayed image.

use rustc_hash::FxHashMap;

use chronicle_core::{Error, ObjectId, PersistentObject, Result};

/// One object known to a unit of work
#[derive(Debug, Clone)]
pub struct TrackedObject {
    /// State seen and edited by application code
    pub current: PersistentObject,
    /// State at the last flush; None while transient
    pub flushed: Option<PersistentObject>,
    /// State before this unit of work; None for new objects
    pub original: Option<PersistentObject>,
    /// Explicitly created (saved on flush without a cascade)
    pub save_requested: bool,
    /// Marked for deletion
    pub deleted: bool,
    /// Deletion already reported to the lock validator
    pub delete_flushed: bool,
    /// State was replaced by a historical version
    pub rolled_back: bool,
}

impl TrackedObject {
    /// Track an object read from the store
    pub fn loaded(object: PersistentObject) -> Self {
        TrackedObject {
            flushed: Some(object.clone()),
            original: Some(object.clone()),
            current: object,
            save_requested: false,
            deleted: false,
            delete_flushed: false,
            rolled_back: false,
        }
    }

    /// Track an object created in this unit of work
    pub fn created(object: PersistentObject, save_requested: bool) -> Self {
        TrackedObject {
            current: object,
            flushed: None,
            original: None,
            save_requested,
            deleted: false,
            delete_flushed: false,
            rolled_back: false,
        }
    }

    /// Object id
    pub fn id(&self) -> ObjectId {
        self.current.id
    }

    /// Not yet saved
    pub fn is_transient(&self) -> bool {
        self.flushed.is_none()
    }

    /// Created in this unit of work
    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    /// Owning parent, falling back to the original parent of a detached object
    pub fn parent(&self) -> Option<ObjectId> {
        self.current
            .parent
            .or_else(|| self.original.as_ref().and_then(|o| o.parent))
    }

    /// State differs from the last flush
    pub fn is_modified(&self) -> bool {
        match &self.flushed {
            Some(flushed) => self.current.differs_from(flushed),
            None => false,
        }
    }

    /// Replace the state with a historical image
    pub fn restore(&mut self, image: PersistentObject) {
        self.flushed = Some(image.clone());
        self.original = Some(image.clone());
        self.current = image;
        self.deleted = false;
        self.delete_flushed = false;
        self.rolled_back = true;
    }

    /// Mark the object as not existing at the as-of date
    pub fn restore_deleted(&mut self) {
        self.deleted = true;
        self.delete_flushed = true;
        self.rolled_back = true;
    }
}

/// Arena of tracked objects, in tracking order
#[derive(Debug, Default)]
pub struct ObjectArena {
    objects: Vec<TrackedObject>,
    index: FxHashMap<ObjectId, usize>,
}

impl ObjectArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an object; fails if it is already tracked
    pub fn insert(&mut self, object: TrackedObject) -> Result<usize> {
        let id = object.id();
        if self.index.contains_key(&id) {
            return Err(Error::InvalidOperation(format!("object {} is already tracked", id)));
        }
        let idx = self.objects.len();
        self.objects.push(object);
        self.index.insert(id, idx);
        Ok(idx)
    }

    /// Check whether an object is tracked
    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    /// Tracked object by id
    pub fn get(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.index.get(&id).map(|&idx| &self.objects[idx])
    }

    /// Mutable tracked object by id
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut TrackedObject> {
        match self.index.get(&id) {
            Some(&idx) => Some(&mut self.objects[idx]),
            None => None,
        }
    }

    /// Tracked object by id, or `ObjectNotFound`
    pub fn require(&self, id: ObjectId) -> Result<&TrackedObject> {
        self.get(id).ok_or(Error::ObjectNotFound(id))
    }

    /// Mutable tracked object by id, or `ObjectNotFound`
    pub fn require_mut(&mut self, id: ObjectId) -> Result<&mut TrackedObject> {
        self.get_mut(id).ok_or(Error::ObjectNotFound(id))
    }

    /// Object ids in tracking order
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(TrackedObject::id).collect()
    }

    /// Tracked objects in tracking order
    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter()
    }

    /// Number of tracked objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
