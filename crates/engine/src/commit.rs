//! Commit pipeline of one unit of work
//!
//! ```text
//! validate locks vs. actions  -> dirty set        (AccessDenied / ConsistencyViolation)
//! load missing ancestors of locked objects
//! build delta trees, stamp valid-from             (BitemporalViolation)
//! no rows                     -> done, no physical transaction
//! BEGIN
//!   commit log entry          -> Tid
//!   object writes
//!   audit rows, batched
//! COMMIT
//! ```
//!
//! Any error before COMMIT drops the physical transaction, which rolls back
//! every statement issued on it.

use tracing::{debug, trace};
use uuid::Uuid;

use chronicle_core::{NewCommitLogEntry, Result, Tid};
use chronicle_durability::{AuditLogMaterializer, DeltaTree};

use crate::delta_tree::DeltaTreeBuilder;
use crate::unit_of_work::UnitOfWork;

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Commit log identity; None if nothing needed to be written
    pub tid: Option<Tid>,
    /// Correlation id of the unit of work
    pub correlation_id: Uuid,
    /// Delta trees built (one per touched aggregate)
    pub trees: usize,
    /// Object rows upserted or deleted
    pub object_writes: usize,
    /// Audit rows inserted
    pub audit_rows: usize,
    /// Audit insert statements issued
    pub batches: usize,
}

impl CommitOutcome {
    /// Check whether anything was written
    pub fn is_empty(&self) -> bool {
        self.tid.is_none()
    }
}

impl UnitOfWork {
    /// Run everything that must happen before the physical commit
    pub(crate) fn before_transaction_completion(&mut self) -> Result<CommitOutcome> {
        self.flush()?;

        let dirty = self
            .validator
            .check(&self.locks, &self.actions)
            .into_result(self.chronicle.registry())?;
        trace!(target: "chronicle::commit", locks = self.locks.len(), dirty = dirty.len(), "Locks validated");

        self.load_missing_ancestors()?;

        let registry = self.chronicle.registry();
        let trees = DeltaTreeBuilder::new(registry, &self.objects, &self.locks, &dirty, self.options.as_of).build()?;
        let correlation_id = self.options.correlation_id;
        if !trees.iter().any(DeltaTree::has_rows) {
            debug!(target: "chronicle::commit", %correlation_id, "Nothing to write");
            return Ok(CommitOutcome {
                tid: None,
                correlation_id,
                trees: trees.len(),
                object_writes: 0,
                audit_rows: 0,
                batches: 0,
            });
        }

        let entry = NewCommitLogEntry {
            last_updated: chrono::Utc::now(),
            updated_by: self.options.actor,
            comment: self
                .options
                .comment
                .clone()
                .or_else(|| self.chronicle.config().default_comment.clone()),
            correlation_id,
        };

        let materializer = AuditLogMaterializer::new(self.chronicle.codecs(), self.chronicle.config().audit_batch_size);
        let store = self.chronicle.store();
        let mut txn = store.begin()?;
        let materialized = materializer.persist(txn.as_mut(), entry, &trees)?;
        txn.commit()?;

        Ok(CommitOutcome {
            tid: Some(materialized.tid),
            correlation_id,
            trees: trees.len(),
            object_writes: materialized.object_writes,
            audit_rows: materialized.audit_rows,
            batches: materialized.batches,
        })
    }
}
