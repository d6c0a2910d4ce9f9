//! Failure injection for the in-memory store
//!
//! Fail points make a specific statement of `MemoryStore` fail so tests can
//! check that a physical transaction leaves nothing behind, and simulate a
//! competing allocator winning the counter race.
//!
//! # Example
//!
//! ```ignore
//! use chronicle_storage::testing::FailPoint;
//!
//! store.inject(FailPoint::ObjectWrite(None));
//! assert!(uow.commit().is_err());
//! assert_eq!(store.commit_log_len(), 0);
//! ```

use chronicle_core::{Error, ObjectId, Result};
use parking_lot::Mutex;

/// A statement that should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Inserting the commit log entry fails
    CommitLogInsert,
    /// Writing an object row fails (`None` = any object)
    ObjectWrite(Option<ObjectId>),
    /// Inserting a batch of audit rows fails
    AuditInsert,
    /// The final commit of a physical transaction fails
    Commit,
    /// The next `remaining` conditional counter updates lose the race to a
    /// simulated competing allocator
    CounterContention {
        /// Number of updates still to lose
        remaining: u32,
    },
}

/// Site at which a fail point is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailSite {
    CommitLogInsert,
    ObjectWrite(ObjectId),
    AuditInsert,
    Commit,
}

impl FailPoint {
    fn triggers_at(&self, site: FailSite) -> bool {
        match (self, site) {
            (FailPoint::CommitLogInsert, FailSite::CommitLogInsert) => true,
            (FailPoint::ObjectWrite(None), FailSite::ObjectWrite(_)) => true,
            (FailPoint::ObjectWrite(Some(target)), FailSite::ObjectWrite(id)) => *target == id,
            (FailPoint::AuditInsert, FailSite::AuditInsert) => true,
            (FailPoint::Commit, FailSite::Commit) => true,
            _ => false,
        }
    }
}

/// Set of armed fail points
#[derive(Debug, Default)]
pub(crate) struct FailPoints {
    points: Mutex<Vec<FailPoint>>,
}

impl FailPoints {
    pub(crate) fn inject(&self, point: FailPoint) {
        self.points.lock().push(point);
    }

    pub(crate) fn clear(&self) {
        self.points.lock().clear();
    }

    /// Fail if an armed point matches the site
    pub(crate) fn check(&self, site: FailSite) -> Result<()> {
        if self.points.lock().iter().any(|p| p.triggers_at(site)) {
            return Err(Error::Storage(format!("injected failure at {:?}", site)));
        }
        Ok(())
    }

    /// Consume one lost counter race, if any is armed
    pub(crate) fn take_contention(&self) -> bool {
        let mut points = self.points.lock();
        for point in points.iter_mut() {
            if let FailPoint::CounterContention { remaining } = point {
                if *remaining > 0 {
                    *remaining -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::EntityTag;

    #[test]
    fn test_object_write_targets() {
        let a = ObjectId::from_parts(EntityTag(1), 0, 1).unwrap();
        let b = ObjectId::from_parts(EntityTag(1), 0, 2).unwrap();

        let points = FailPoints::default();
        points.inject(FailPoint::ObjectWrite(Some(a)));
        assert!(points.check(FailSite::ObjectWrite(a)).is_err());
        assert!(points.check(FailSite::ObjectWrite(b)).is_ok());
        assert!(points.check(FailSite::Commit).is_ok());

        points.clear();
        assert!(points.check(FailSite::ObjectWrite(a)).is_ok());
    }

    #[test]
    fn test_contention_is_consumed() {
        let points = FailPoints::default();
        points.inject(FailPoint::CounterContention { remaining: 2 });
        assert!(points.take_contention());
        assert!(points.take_contention());
        assert!(!points.take_contention());
    }
}
