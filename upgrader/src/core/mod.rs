//! Deterministic, pure logic for the upgrade workflow.
//!
//! Core modules are free of I/O side effects. They operate on the run state
//! and plain values and return deterministic outputs suitable for tests.

pub mod branch;
pub mod diagnostics;
pub mod invariants;
pub mod plan;
pub mod router;
pub mod state;
pub mod summary;
pub mod types;
