//! Apply-Transforms: run the complete accumulated plan.

use tracing::{info, instrument, warn};

use crate::core::state::RunState;
use crate::core::types::Verification;
use crate::io::transform::TransformEngine;
use crate::nodes::{FatalError, NodeResult, RunSettings};

/// Engine crashes and malformed entries are fatal. A timeout is recorded as a
/// failed verification and sent straight to the router.
#[instrument(skip_all, fields(plan_len = state.transform_plan().len()))]
pub fn run<T: TransformEngine>(
    mut state: RunState,
    engine: &T,
    settings: &RunSettings,
) -> NodeResult {
    let report = match engine.apply(
        state.workdir(),
        state.build_system(),
        state.transform_plan(),
        settings.transform_timeout,
    ) {
        Ok(report) => report,
        Err(err) => {
            let reason = settings.describe(&err);
            return NodeResult::Fatal(state, FatalError::TransformEngine(reason));
        }
    };

    if report.timed_out {
        warn!("transform engine timed out; treating as a failed verification");
        let text = format!(
            "{}\n[transform engine timed out after {}s]",
            report.output.trim_end(),
            settings.transform_timeout.as_secs()
        );
        state.record_applied(Vec::new());
        state.record_verification(Verification {
            timed_out: true,
            ..Verification::failure(settings.scrub(&text))
        });
        return NodeResult::Retryable(state);
    }

    let skipped = state.transform_plan().len().saturating_sub(report.applied.len());
    info!(applied = report.applied.len(), skipped, "transforms applied");
    state.record_applied(report.applied);
    NodeResult::Advance(state)
}
