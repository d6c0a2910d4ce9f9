//! Deltas: what one audit row records about one object

use chrono::{DateTime, Utc};

use chronicle_core::{AuditAction, EntityTag, Error, PersistentObject, Result};

/// Prior and new image of one object in one commit
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// Entity type of the object
    pub entity_tag: EntityTag,
    /// Schema version the images were written with
    pub schema_version: u8,
    /// What happened to the object
    pub action: AuditAction,
    /// Business-effective date of the new version
    pub valid_from: DateTime<Utc>,
    /// The aggregate had been rolled back when this delta was written
    pub rolled_back: bool,
    /// State before the commit (None for inserts)
    pub prior: Option<PersistentObject>,
    /// State after the commit (None for deletes)
    pub new: Option<PersistentObject>,
}

/// State an object takes when a delta is replayed
#[derive(Debug, Clone, PartialEq)]
pub enum Replay {
    /// Object takes the new image
    Restore(PersistentObject),
    /// Object no longer exists at that point in time
    Deleted,
}

impl Delta {
    /// Replay the delta onto an object
    ///
    /// A Delete delta marks the object deleted; any other delta replaces the
    /// whole state with the new image, stamped with the delta's valid-from.
    pub fn replay(&self) -> Result<Replay> {
        if self.action == AuditAction::Delete {
            return Ok(Replay::Deleted);
        }
        let mut state = self.new.clone().ok_or_else(|| Error::DeltaDecode {
            reason: format!("{:?} delta for entity tag {} carries no new image", self.action, self.entity_tag),
        })?;
        state.valid_from = self.valid_from;
        Ok(Replay::Restore(state))
    }
}
