//! Concurrency layer for chronicle
//!
//! This crate holds everything that arbitrates between writers:
//! - IdentifierAllocator: hi/lo ObjectId allocation against shared counter rows
//! - LockRegistry: per-unit-of-work declared mutation intents
//! - ActionValidator: commit-time check of observed actions against locks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod lock;
pub mod validation;

pub use allocator::IdentifierAllocator;
pub use lock::LockRegistry;
pub use validation::{validate, ActionLog, ActionSequence, ActionValidator, ActionViolation, Validation, ValidationResult};
