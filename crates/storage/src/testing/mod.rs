//! Testing utilities for the store
//!
//! - **Fail points**: make individual statements of `MemoryStore` fail, or make
//!   the allocator lose counter races, to exercise atomicity and retry paths.

mod fail_point;

pub use fail_point::FailPoint;
pub(crate) use fail_point::{FailPoints, FailSite};
