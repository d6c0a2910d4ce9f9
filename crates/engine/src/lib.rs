//! Unit-of-work engine for chronicle
//!
//! This crate orchestrates all lower layers:
//! - Chronicle: shared handle (registry, store, allocator, codecs, config)
//! - UnitOfWork: tracked objects, locks, lifecycle callbacks, flush
//! - Commit: validation, delta trees, bitemporal stamping, materialization
//! - Rollback: replay of historical deltas onto tracked objects
//!
//! The engine is the only component that knows about:
//! - Aggregate boundaries (ownership edges, roots)
//! - The historization policy of each entity type
//! - Cross-layer coordination (validator + codec + store)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitemporal;
pub mod commit;
pub mod coordinator;
pub mod database;
pub mod delta_tree;
pub mod rollback;
pub mod tracked;
pub mod unit_of_work;

pub use bitemporal::{aggregate_valid_from, check_inception, AggregateValidFrom};
pub use commit::CommitOutcome;
pub use coordinator::{UnitOfWorkCoordinator, UnitOfWorkMetrics};
pub use database::{Chronicle, ChronicleConfig, CONFIG_FILE_NAME};
pub use delta_tree::DeltaTreeBuilder;
pub use rollback::{RollbackEngine, RollbackReport};
pub use tracked::{ObjectArena, TrackedObject};
pub use unit_of_work::{UnitOfWork, UnitOfWorkOptions};
