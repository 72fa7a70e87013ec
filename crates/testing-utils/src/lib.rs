//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the scheduler workspace: hand-written test
//! doubles for the collaborator traits, a `Job` builder, and small helpers.
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
