//! Shared test utilities for archive-sync integration tests.
//!
//! - `TestHarness`: temp folders, an in-memory database and helpers to
//!   assemble the pipeline around them
//! - fault-injecting search engines and a slow copy method

pub mod engines;
pub mod harness;

pub use engines::*;
pub use harness::TestHarness;
