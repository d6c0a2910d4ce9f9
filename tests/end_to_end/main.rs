//! End-to-end tests through the `chronicle` facade
//!
//! - lifecycle: create, amend, cancel, and read back at earlier dates
//! - configuration: engine settings loaded from `chronicle.toml`

#[path = "../common/mod.rs"]
mod common;

mod configuration;
mod lifecycle;
