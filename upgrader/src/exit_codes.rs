//! Stable exit codes for the upgrader CLI.

/// Run finished with a merged-candidate or best-effort pull request.
pub const OK: i32 = 0;
/// Run aborted: infrastructure failure, ambiguous project, or the PR step failed.
pub const ABORTED: i32 = 1;
/// Invalid invocation or configuration; no run was started.
pub const INVALID: i32 = 2;
/// Operator cancelled the run (SIGINT).
pub const CANCELLED: i32 = 130;
