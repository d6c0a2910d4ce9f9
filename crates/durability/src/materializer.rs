//! Audit log materializer
//!
//! Turns the delta trees of a commit into store statements, all inside one
//! physical transaction:
//!
//! 1. insert the commit log entry and take its Tid
//! 2. write the object rows of every dirty node
//! 3. insert one audit row per node that is dirty or has a dirty descendant,
//!    in batches of `batch_size`
//!
//! The caller commits the transaction. If any step fails the caller drops it
//! and nothing survives: no commit log entry, no object row, no audit row.

use tracing::{debug, trace};

use chronicle_core::{AuditAction, AuditLogRow, Error, NewCommitLogEntry, ObjectId, Result, Tid};
use chronicle_storage::{ObjectRow, ObjectWrite, StoreTransaction};

use crate::codec::CodecRegistry;
use crate::delta::Delta;
use crate::tree::{DeltaNode, DeltaTree};

/// Statements issued for one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedCommit {
    /// Identity of the commit log entry
    pub tid: Tid,
    /// Object rows written or removed
    pub object_writes: usize,
    /// Audit rows inserted
    pub audit_rows: usize,
    /// Audit insert statements issued
    pub batches: usize,
}

/// Writes commit log, object rows and audit rows for a set of delta trees
#[derive(Debug, Clone, Copy)]
pub struct AuditLogMaterializer<'a> {
    codecs: &'a CodecRegistry,
    batch_size: usize,
}

impl<'a> AuditLogMaterializer<'a> {
    /// Create a materializer; a batch size of 0 is treated as 1
    pub fn new(codecs: &'a CodecRegistry, batch_size: usize) -> Self {
        AuditLogMaterializer {
            codecs,
            batch_size: batch_size.max(1),
        }
    }

    /// Audit rows of one tree, in pre-order, stamped with `tid`
    pub fn rows(&self, tree: &DeltaTree, tid: Tid) -> Result<Vec<AuditLogRow>> {
        let mut rows = Vec::new();
        for idx in tree.preorder() {
            let node = tree.node(idx);
            if !node.needs_row() {
                continue;
            }
            let action = if node.is_dirty { node.action } else { AuditAction::Update };
            let delta = self.delta_for(node, action)?;
            rows.push(AuditLogRow {
                tid,
                object_id: node.object_id,
                root_object_id: node.root_object_id,
                parent_object_id: node.parent_object_id,
                entity_tag: node.entity_tag,
                valid_from: node.valid_from,
                action,
                object_delta: self.codecs.encode_delta(&delta)?,
                is_archived: false,
            });
        }
        Ok(rows)
    }

    /// Object writes of one tree: one per dirty node
    pub fn object_writes(&self, tree: &DeltaTree) -> Result<Vec<ObjectWrite>> {
        let mut writes = Vec::new();
        for idx in tree.preorder() {
            let node = tree.node(idx);
            if !node.is_dirty {
                continue;
            }
            let write = match (node.action, &node.new_state) {
                (AuditAction::Delete, None) => ObjectWrite::Delete(node.object_id),
                (AuditAction::Delete, Some(_)) => {
                    return Err(Error::InvalidOperation(format!(
                        "Delete of {} still carries a live state",
                        node.object_id
                    )))
                }
                (_, Some(state)) => ObjectWrite::Upsert(ObjectRow {
                    object_id: node.object_id,
                    entity_tag: node.entity_tag,
                    valid_from: state.valid_from,
                    payload: self.codecs.encode_object(state)?,
                }),
                (action, None) => return Err(missing_state(node.object_id, action)),
            };
            writes.push(write);
        }
        Ok(writes)
    }

    /// Issue every statement of a commit on `txn`
    pub fn persist(
        &self,
        txn: &mut dyn StoreTransaction,
        entry: NewCommitLogEntry,
        trees: &[DeltaTree],
    ) -> Result<MaterializedCommit> {
        let tid = txn.insert_commit_log(entry)?;
        trace!(target: "chronicle::commit", %tid, trees = trees.len(), "Commit log entry staged");

        let mut object_writes = 0;
        for tree in trees {
            for write in self.object_writes(tree)? {
                txn.write_object(write)?;
                object_writes += 1;
            }
        }

        let mut rows = Vec::new();
        for tree in trees {
            rows.extend(self.rows(tree, tid)?);
        }

        let mut batches = 0;
        for batch in rows.chunks(self.batch_size) {
            let inserted = txn.insert_audit_rows(batch)?;
            if inserted != batch.len() {
                return Err(Error::Storage(format!(
                    "audit insert for {} wrote {} of {} rows",
                    tid,
                    inserted,
                    batch.len()
                )));
            }
            batches += 1;
        }

        debug!(
            target: "chronicle::commit",
            %tid,
            object_writes,
            audit_rows = rows.len(),
            batches,
            "Audit log materialized"
        );
        Ok(MaterializedCommit {
            tid,
            object_writes,
            audit_rows: rows.len(),
            batches,
        })
    }

    fn delta_for(&self, node: &DeltaNode, action: AuditAction) -> Result<Delta> {
        let codec = self.codecs.codec(node.entity_tag)?;
        let new = match action {
            AuditAction::Delete => None,
            _ => {
                let mut state = node
                    .new_state
                    .clone()
                    .ok_or_else(|| missing_state(node.object_id, action))?;
                state.valid_from = node.valid_from;
                Some(state)
            }
        };
        Ok(Delta {
            entity_tag: node.entity_tag,
            schema_version: codec.descriptor().schema_version,
            action,
            valid_from: node.valid_from,
            rolled_back: node.rolled_back,
            prior: node.prior_state.clone(),
            new,
        })
    }
}

fn missing_state(object_id: ObjectId, action: AuditAction) -> Error {
    Error::InvalidOperation(format!("{:?} of {} has no state to write", action, object_id))
}
