//! Shared test utilities for ledgerscan integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with a scratch input directory and an
//!   in-memory record store
//! - `ScriptedProvider`, an in-process extraction backend
//! - Builders for model replies and records

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedProvider, Step, TestHarness};
