//! Finalize: the single exit. Commit, push and open the pull request when the
//! run reached here through the router, then assign the outcome and report.

use tracing::{error, info, instrument, warn};

use crate::core::router;
use crate::core::state::RunState;
use crate::core::summary::{
    ReportContext, commit_message, pull_request_body, pull_request_title, summary_report,
};
use crate::core::types::TerminalOutcome;
use crate::io::git::Vcs;
use crate::io::hosting::{CodeHost, PullRequest};
use crate::nodes::{FatalError, RunSettings};

pub const NO_CHANGES: &str = "no changes to propose";

/// How the run arrived at Finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    BuildGreen,
    AttemptsExhausted,
    /// Fatal error or cancellation: report only, no side effects.
    Aborted(FatalError),
}

impl From<router::Disposition> for Disposition {
    fn from(value: router::Disposition) -> Self {
        match value {
            router::Disposition::BuildGreen => Disposition::BuildGreen,
            router::Disposition::AttemptsExhausted => Disposition::AttemptsExhausted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinalizeOutput {
    pub state: RunState,
    pub pull_request_url: Option<String>,
    pub summary_report: String,
}

#[instrument(skip_all)]
pub fn run<V: Vcs, H: CodeHost>(
    mut state: RunState,
    disposition: Disposition,
    vcs: &V,
    host: &H,
    settings: &RunSettings,
) -> FinalizeOutput {
    let mut ctx = ReportContext::default();
    let claimed = match disposition {
        Disposition::BuildGreen => Ok(TerminalOutcome::MergedCandidate),
        Disposition::AttemptsExhausted => Ok(TerminalOutcome::BestEffort),
        Disposition::Aborted(err) => Err(err),
    };
    let outcome = match claimed {
        Ok(claimed) => match publish(&state, claimed, vcs, host, settings) {
            Ok(url) => {
                ctx.pull_request_url = Some(url);
                claimed
            }
            Err(reason) => {
                warn!(%reason, "finalize side effects failed");
                ctx.pull_request_note = Some(reason.clone());
                ctx.abort_reason = Some(reason);
                TerminalOutcome::Aborted
            }
        },
        Err(err) => {
            let note = match err {
                FatalError::Cancelled => "run cancelled",
                _ => "run aborted",
            };
            ctx.abort_reason = Some(err.to_string());
            ctx.pull_request_note = Some(note.to_string());
            TerminalOutcome::Aborted
        }
    };

    if let Err(err) = state.assign_outcome(outcome) {
        error!(%err, "terminal outcome was already assigned");
    }
    info!(outcome = %outcome, "run finalized");

    let summary_report = summary_report(&state, &ctx);
    if let Some(artifacts) = &settings.artifacts {
        let written = artifacts
            .write_run(&state)
            .and_then(|_| artifacts.write_report(&summary_report));
        if let Err(err) = written {
            warn!(err = %format!("{err:#}"), "failed to write run artifacts");
        }
    }
    FinalizeOutput {
        state,
        pull_request_url: ctx.pull_request_url,
        summary_report,
    }
}

/// Commit, push and open the pull request. Stops before each irreversible
/// step once cancellation is observed.
fn publish<V: Vcs, H: CodeHost>(
    state: &RunState,
    outcome: TerminalOutcome,
    vcs: &V,
    host: &H,
    settings: &RunSettings,
) -> Result<String, String> {
    let cancelled = || {
        if settings.cancel.is_cancelled() {
            Err(FatalError::Cancelled.to_string())
        } else {
            Ok(())
        }
    };

    cancelled()?;
    let committed = vcs
        .commit_all(state.workdir(), &commit_message(state))
        .map_err(|err| format!("commit failed: {}", settings.describe(&err)))?;
    if !committed {
        return Err(NO_CHANGES.to_string());
    }

    cancelled()?;
    vcs.push(state.workdir(), state.working_branch())
        .map_err(|err| format!("push failed: {}", settings.describe(&err)))?;

    cancelled()?;
    let title = pull_request_title(state.versions(), state.target_version());
    let body = settings.redactor.redact(&pull_request_body(state, outcome));
    host.open_pull_request(&PullRequest {
        repository_url: state.repository_url(),
        base_branch: state.base_branch(),
        head_branch: state.working_branch(),
        title: &title,
        body: &body,
    })
    .map_err(|err| format!("pull request creation failed: {}", settings.describe(&err)))
}
