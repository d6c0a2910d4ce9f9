//! Storage layer for chronicle
//!
//! This crate defines the relational store seam and an in-process backend:
//! - Store / StoreTransaction: counter, commit-log, audit-log and object statements
//! - MemoryStore: RwLock-guarded tables with identity Tids
//! - testing::FailPoint: failure injection for atomicity tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod testing;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{ObjectRow, ObjectWrite, Store, StoreTransaction};
