//! Workflow nodes. Each takes the run state by value and hands back a
//! [`NodeResult`] telling the driver where to go next.

pub mod analysis;
pub mod apply;
pub mod finalize;
pub mod setup;
pub mod troubleshoot;
pub mod verify;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::core::diagnostics::Redactor;
use crate::core::state::RunState;
use crate::io::artifacts::ArtifactWriter;

/// Outcome of one node execution.
#[derive(Debug)]
pub enum NodeResult {
    /// Work done; continue along the normal edge.
    Advance(RunState),
    /// Expected failure recorded in state; go to the router.
    Retryable(RunState),
    /// Unrecoverable; go to Finalize without side effects.
    Fatal(RunState, FatalError),
}

/// Run-terminating failures. Messages are already scrubbed of secrets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    #[error("invalid working branch name: {0}")]
    InvalidBranch(String),
    #[error("repository setup failed: {0}")]
    Setup(String),
    #[error("build system detection failed: {0}")]
    BuildSystem(String),
    #[error("transform engine failed: {0}")]
    TransformEngine(String),
    #[error("build tool could not run: {0}")]
    BuildTool(String),
    #[error("state integrity violation: {0}")]
    Integrity(String),
    #[error("node execution limit of {0} reached")]
    NodeLimit(usize),
    #[error("run cancelled by operator")]
    Cancelled,
}

/// Run-wide settings passed to every node.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Per-run scratch directory holding the clone and engine files.
    pub scratch_dir: PathBuf,
    pub verify_timeout: Duration,
    pub transform_timeout: Duration,
    pub diagnostic_limit_bytes: usize,
    pub redactor: Redactor,
    pub artifacts: Option<ArtifactWriter>,
    pub cancel: CancelToken,
}

impl RunSettings {
    /// Settings with default timeouts and no artifacts, rooted at `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            verify_timeout: Duration::from_secs(1800),
            transform_timeout: Duration::from_secs(1800),
            diagnostic_limit_bytes: 16_000,
            redactor: Redactor::default(),
            artifacts: None,
            cancel: CancelToken::new(),
        }
    }

    /// Redact secrets and bound the text to the diagnostic limit.
    pub fn scrub(&self, text: &str) -> String {
        self.redactor.scrub(text, self.diagnostic_limit_bytes)
    }

    /// Render an error chain for state or report, secrets removed.
    pub fn describe(&self, err: &anyhow::Error) -> String {
        self.scrub(&format!("{err:#}"))
    }
}
