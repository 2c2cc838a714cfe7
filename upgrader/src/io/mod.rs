//! Side-effecting collaborators and their plumbing.
//!
//! Each external system sits behind a narrow synchronous trait so the workflow
//! can be driven by scripted fakes in tests.

pub mod advisor;
pub mod artifacts;
pub mod build;
pub mod config;
pub mod git;
pub mod hosting;
pub mod http;
pub mod process;
pub mod prompt;
pub mod secrets;
pub mod transform;
