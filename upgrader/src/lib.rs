//! Bounded repair loop for Java/Spring Boot upgrades.
//!
//! A run clones a repository, plans OpenRewrite transforms, applies them,
//! builds, and feeds build failures back to an advisory model for one extra
//! transform per attempt until the build is green or the attempt budget is
//! spent. Every run ends in Finalize, which opens a pull request when it can
//! and always emits a report.
//!
//! - **[`core`]**: pure, deterministic logic (run state, router, transition
//!   contract, plan helpers, rendering). No I/O.
//! - **[`io`]**: collaborators behind narrow traits (git, build tool, rewrite
//!   engine, advisory model, code host) plus config and secrets.
//! - **[`nodes`]**: the six workflow nodes.
//! - **[`workflow`]**: the driver that sequences nodes and owns the state.

pub mod cancel;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod nodes;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
