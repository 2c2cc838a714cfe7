//! The driver: an explicit state machine over the workflow nodes.
//!
//! ```text
//! Setup -> Analysis -> Apply -> Verify -> route -+-> Finalize
//!                        ^                       |
//!                        +---- Troubleshoot <----+
//! ```
//!
//! The driver owns the run state, snapshots it before each node and checks
//! the transition afterwards. Cancellation is observed between nodes.

use tracing::{error, info, info_span, warn};

use crate::core::invariants::{check_node_output, check_transition};
use crate::core::router::{Route, route};
use crate::core::state::RunState;
use crate::core::summary::setup_failure_report;
use crate::core::types::{NodeKind, TerminalOutcome};
use crate::io::advisor::Advisor;
use crate::io::build::BuildTool;
use crate::io::git::Vcs;
use crate::io::hosting::CodeHost;
use crate::io::transform::TransformEngine;
use crate::nodes::finalize::{self, Disposition};
use crate::nodes::setup::{self, RunRequest};
use crate::nodes::{FatalError, NodeResult, RunSettings, analysis, apply, troubleshoot, verify};

/// Everything a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub pull_request_url: Option<String>,
    pub summary_report: String,
    pub terminal_outcome: TerminalOutcome,
    /// Fatal error that sent the run to Finalize early, if any.
    pub fatal: Option<FatalError>,
    /// Nodes in execution order.
    pub trail: Vec<NodeKind>,
    /// Final state; `None` when Setup failed.
    pub state: Option<RunState>,
}

/// Upper bound on node executions for a run with `max_attempts`.
///
/// Setup, Analysis and Finalize run once; every attempt adds Troubleshoot,
/// Apply and Verify on top of the first Apply and Verify.
pub fn node_limit(max_attempts: u32) -> usize {
    let attempts = usize::try_from(max_attempts).unwrap_or(usize::MAX);
    attempts.saturating_add(1).saturating_mul(3).saturating_add(2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Run(NodeKind),
    Route,
    Finalize(Disposition),
}

/// The workflow bound to its collaborators and run settings.
pub struct Workflow<'a, V, B, T, A, H> {
    vcs: &'a V,
    build: &'a B,
    engine: &'a T,
    advisor: &'a A,
    host: &'a H,
    settings: RunSettings,
}

impl<'a, V, B, T, A, H> Workflow<'a, V, B, T, A, H>
where
    V: Vcs,
    B: BuildTool,
    T: TransformEngine,
    A: Advisor,
    H: CodeHost,
{
    pub fn new(
        vcs: &'a V,
        build: &'a B,
        engine: &'a T,
        advisor: &'a A,
        host: &'a H,
        settings: RunSettings,
    ) -> Self {
        Self {
            vcs,
            build,
            engine,
            advisor,
            host,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execute one run to completion. Always produces a report.
    pub fn run(&self, request: &RunRequest) -> RunOutcome {
        let span = info_span!("run", base = %request.base_branch);
        let _guard = span.enter();
        let mut trail = vec![NodeKind::Setup];

        if self.settings.cancel.is_cancelled() {
            return self.setup_failed(request, FatalError::Cancelled, trail);
        }
        let mut state = match setup::run(self.vcs, request, &self.settings) {
            Ok(state) => state,
            Err(err) => return self.setup_failed(request, err, trail),
        };

        let limit = node_limit(state.max_attempts());
        let mut executed = 1usize;
        let mut step = Step::Run(NodeKind::Analysis);

        let disposition = loop {
            let kind = match step {
                Step::Finalize(disposition) => break disposition,
                _ if self.settings.cancel.is_cancelled() => {
                    warn!("cancellation observed at node boundary");
                    step = Step::Finalize(Disposition::Aborted(FatalError::Cancelled));
                    continue;
                }
                Step::Route => {
                    step = match route(&state) {
                        Route::Troubleshoot => Step::Run(NodeKind::Troubleshoot),
                        Route::Finalize(disposition) => Step::Finalize(disposition.into()),
                    };
                    continue;
                }
                Step::Run(kind) => kind,
            };
            if executed >= limit {
                error!(limit, "node execution limit reached");
                step = Step::Finalize(Disposition::Aborted(FatalError::NodeLimit(limit)));
                continue;
            }

            info!(node = %kind, attempt = state.attempt_count(), "entering node");
            let before = state.clone();
            trail.push(kind);
            executed += 1;
            let (after, next, completed) = match self.execute(kind, state) {
                NodeResult::Advance(after) => (after, advance_edge(kind), true),
                NodeResult::Retryable(after) => (after, Step::Route, true),
                NodeResult::Fatal(after, err) => {
                    warn!(node = %kind, %err, "fatal node failure");
                    (after, Step::Finalize(Disposition::Aborted(err)), false)
                }
            };

            // A fatal node stops mid-way; only the structural rules apply to it.
            let mut violations = check_transition(&before, &after, kind);
            if completed {
                violations.extend(check_node_output(&after, kind));
            }
            if violations.is_empty() {
                state = after;
                step = next;
            } else {
                let detail = violations.join("; ");
                error!(node = %kind, %detail, "state transition violated");
                state = before;
                step = Step::Finalize(Disposition::Aborted(FatalError::Integrity(detail)));
            }
        };

        let fatal = match &disposition {
            Disposition::Aborted(err) => Some(err.clone()),
            _ => None,
        };
        trail.push(NodeKind::Finalize);
        let before = state.clone();
        let out = finalize::run(state, disposition, self.vcs, self.host, &self.settings);
        for violation in check_transition(&before, &out.state, NodeKind::Finalize) {
            error!(%violation, "finalize transition violated");
        }

        RunOutcome {
            pull_request_url: out.pull_request_url,
            summary_report: out.summary_report,
            terminal_outcome: out
                .state
                .terminal_outcome()
                .unwrap_or(TerminalOutcome::Aborted),
            fatal,
            trail,
            state: Some(out.state),
        }
    }

    fn execute(&self, kind: NodeKind, state: RunState) -> NodeResult {
        let settings = &self.settings;
        match kind {
            NodeKind::Analysis => analysis::run(state, self.build, self.advisor, settings),
            NodeKind::ApplyTransforms => apply::run(state, self.engine, settings),
            NodeKind::Verify => verify::run(state, self.build, settings),
            NodeKind::Troubleshoot => troubleshoot::run(state, self.advisor, settings),
            NodeKind::Setup | NodeKind::Finalize => {
                let detail = format!("{kind} is not a loop node");
                NodeResult::Fatal(state, FatalError::Integrity(detail))
            }
        }
    }

    fn setup_failed(
        &self,
        request: &RunRequest,
        err: FatalError,
        trail: Vec<NodeKind>,
    ) -> RunOutcome {
        error!(%err, "setup failed");
        let summary_report = setup_failure_report(
            &request.repository_url,
            &request.base_branch,
            &err.to_string(),
        );
        if let Some(artifacts) = &self.settings.artifacts {
            if let Err(write_err) = artifacts.write_report(&summary_report) {
                warn!(err = %format!("{write_err:#}"), "failed to write report artifact");
            }
        }
        RunOutcome {
            pull_request_url: None,
            summary_report,
            terminal_outcome: TerminalOutcome::Aborted,
            fatal: Some(err),
            trail,
            state: None,
        }
    }
}

fn advance_edge(kind: NodeKind) -> Step {
    match kind {
        NodeKind::Setup => Step::Run(NodeKind::Analysis),
        NodeKind::Analysis => Step::Run(NodeKind::ApplyTransforms),
        NodeKind::ApplyTransforms => Step::Run(NodeKind::Verify),
        NodeKind::Verify => Step::Route,
        NodeKind::Troubleshoot => Step::Run(NodeKind::ApplyTransforms),
        NodeKind::Finalize => Step::Finalize(Disposition::Aborted(FatalError::Integrity(
            "finalize has no outgoing edge".to_string(),
        ))),
    }
}
