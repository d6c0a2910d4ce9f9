//! Rollback engine
//!
//! Replaces the in-memory state of objects with the version that was
//! effective at a unit of work's as-of date.
//!
//! ## Algorithm
//!
//! ```text
//! for each chunk of rollback_batch_size pending objects:
//!     rows = store.latest_audit_rows(chunk)         // one batched query
//!     for each row:
//!         row.valid_from == object.valid_from  -> nothing to do
//!         otherwise decode the delta and replay it:
//!             Delete delta -> object is marked deleted
//!             other        -> new image replaces the state
//!         mark the object rolled back, reset its dirty-check baseline
//! ```
//!
//! A failure affects only the object (or, for a failed query, the chunk) it
//! belongs to; every other object is still processed.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use chronicle_core::{AuditLookup, Error, ObjectId};
use chronicle_durability::{CodecRegistry, Replay};
use chronicle_storage::Store;

use crate::tracked::ObjectArena;

/// Outcome of one rollback pass
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Objects whose state was replaced
    pub rolled_back: Vec<ObjectId>,
    /// Objects already at the effective version, or without visible history
    pub unchanged: Vec<ObjectId>,
    /// Objects that could not be rolled back
    pub failures: Vec<(ObjectId, Error)>,
}

impl RollbackReport {
    /// Check whether any object was rolled back
    pub fn rolled_back_any(&self) -> bool {
        !self.rolled_back.is_empty()
    }

    /// Check whether every object was processed without error
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: RollbackReport) {
        self.rolled_back.extend(other.rolled_back);
        self.unchanged.extend(other.unchanged);
        self.failures.extend(other.failures);
    }
}

/// Replays audit deltas onto tracked objects
pub struct RollbackEngine<'a> {
    store: &'a dyn Store,
    codecs: &'a CodecRegistry,
    batch_size: usize,
}

impl<'a> RollbackEngine<'a> {
    /// Create an engine; a batch size of 0 is treated as 1
    pub fn new(store: &'a dyn Store, codecs: &'a CodecRegistry, batch_size: usize) -> Self {
        RollbackEngine {
            store,
            codecs,
            batch_size: batch_size.max(1),
        }
    }

    /// Roll every pending object back to its version effective at `as_of`
    pub fn rollback_events(&self, objects: &mut ObjectArena, pending: &[ObjectId], as_of: DateTime<Utc>) -> RollbackReport {
        let mut report = RollbackReport::default();
        for chunk in pending.chunks(self.batch_size) {
            report.merge(self.rollback_chunk(objects, chunk, as_of));
        }
        if report.rolled_back_any() || !report.is_clean() {
            debug!(
                target: "chronicle::rollback",
                rolled_back = report.rolled_back.len(),
                unchanged = report.unchanged.len(),
                failures = report.failures.len(),
                "Rollback pass finished"
            );
        }
        report
    }

    fn rollback_chunk(&self, objects: &mut ObjectArena, chunk: &[ObjectId], as_of: DateTime<Utc>) -> RollbackReport {
        let mut report = RollbackReport::default();
        let lookups: Vec<AuditLookup> = chunk
            .iter()
            .map(|&object_id| AuditLookup { object_id, as_of })
            .collect();

        let rows = match self.store.latest_audit_rows(&lookups) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(target: "chronicle::rollback", error = %e, objects = chunk.len(), "Rollback lookup failed");
                let reason = e.to_string();
                report.failures = chunk
                    .iter()
                    .map(|&id| (id, Error::Storage(reason.clone())))
                    .collect();
                return report;
            }
        };

        let mut seen = Vec::with_capacity(rows.len());
        for row in rows {
            let object_id = row.object_id;
            seen.push(object_id);
            let Some(tracked) = objects.get_mut(object_id) else {
                continue;
            };
            if row.valid_from == tracked.current.valid_from {
                report.unchanged.push(object_id);
                continue;
            }

            let replay = self
                .codecs
                .decode_delta(&row.object_delta)
                .map_err(Error::from)
                .and_then(|delta| delta.replay());
            match replay {
                Ok(Replay::Restore(mut image)) => {
                    image.valid_from = row.valid_from;
                    tracked.restore(image);
                    report.rolled_back.push(object_id);
                }
                Ok(Replay::Deleted) => {
                    tracked.restore_deleted();
                    report.rolled_back.push(object_id);
                }
                Err(e) => {
                    warn!(target: "chronicle::rollback", %object_id, tid = %row.tid, error = %e, "Delta replay failed");
                    report.failures.push((object_id, e));
                }
            }
        }

        for &object_id in chunk {
            if !seen.contains(&object_id) {
                debug!(target: "chronicle::rollback", %object_id, "No visible history, state kept");
                report.unchanged.push(object_id);
            }
        }
        report
    }
}
