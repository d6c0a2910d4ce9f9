//! Durability layer for chronicle
//!
//! This crate turns a commit into durable audit records:
//! - codec: versioned, checksummed binary frames for object rows and deltas
//! - delta: prior/new images of one object and their replay
//! - tree: arena-indexed delta trees, one per aggregate
//! - materializer: commit log, object rows and audit rows in one transaction

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod delta;
pub mod materializer;
pub mod tree;

pub use codec::{CodecError, CodecRegistry, DeltaCodec};
pub use delta::{Delta, Replay};
pub use materializer::{AuditLogMaterializer, MaterializedCommit};
pub use tree::{DeltaNode, DeltaTree};
