//! Shared test utilities for citybingo integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring the core components over temp directories and an
//!   in-memory database
//! - fake generators and stores with controllable failure modes

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
