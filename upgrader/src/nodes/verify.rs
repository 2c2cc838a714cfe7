//! Verify: full build and test run. A red build is data, not an error.

use tracing::{info, instrument};

use crate::core::state::RunState;
use crate::io::build::BuildTool;
use crate::nodes::{FatalError, NodeResult, RunSettings};

#[instrument(skip_all, fields(attempt = state.attempt_count()))]
pub fn run<B: BuildTool>(mut state: RunState, build: &B, settings: &RunSettings) -> NodeResult {
    let mut verification =
        match build.verify(state.workdir(), state.build_system(), settings.verify_timeout) {
            Ok(verification) => verification,
            Err(err) => {
                let reason = settings.describe(&err);
                return NodeResult::Fatal(state, FatalError::BuildTool(reason));
            }
        };
    verification.diagnostic_text = settings.scrub(&verification.diagnostic_text);
    let green = verification.is_success();
    info!(green, timed_out = verification.timed_out, "verification recorded");
    state.record_verification(verification);
    if green {
        NodeResult::Advance(state)
    } else {
        NodeResult::Retryable(state)
    }
}
