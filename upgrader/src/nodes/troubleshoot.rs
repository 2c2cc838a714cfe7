//! Troubleshoot: one repair attempt per visit.
//!
//! The attempt is counted before the advisory model is consulted, so a failed
//! or useless reply still spends budget.

use tracing::{info, instrument, warn};

use crate::core::plan::validate_transform;
use crate::core::state::RunState;
use crate::io::advisor::{Advisor, FixRequest};
use crate::nodes::{NodeResult, RunSettings};

const NO_OUTPUT: &str = "(build produced no diagnostic output)";

#[instrument(skip_all, fields(attempt = state.attempt_count() + 1, max = state.max_attempts()))]
pub fn run<A: Advisor>(mut state: RunState, advisor: &A, settings: &RunSettings) -> NodeResult {
    let attempt = state.begin_attempt();
    let diagnostic_text = state
        .last_verification()
        .map(|verification| verification.diagnostic_text.clone())
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| NO_OUTPUT.to_string());
    state.record_error(attempt, diagnostic_text.clone());
    if let Some(artifacts) = &settings.artifacts {
        if let Err(err) = artifacts.write_attempt_diagnostic(attempt, &diagnostic_text) {
            warn!(err = %format!("{err:#}"), "failed to write attempt artifact");
        }
    }

    let reply = advisor.synthesize_fix(&FixRequest {
        diagnostic_text: &diagnostic_text,
        build_system: state.build_system(),
        versions: state.versions(),
        target_version: state.target_version(),
        plan: state.transform_plan(),
        attempt,
        max_attempts: state.max_attempts(),
    });

    match reply {
        Ok(Some(transform)) => match validate_transform(&transform) {
            Ok(()) => {
                info!(transform = %transform.name, "fix appended to plan");
                state.append_transform(transform);
            }
            Err(reason) => {
                warn!(name = %transform.name, %reason, "rejecting malformed fix");
                state.add_note(format!("attempt {attempt}: proposed fix rejected ({reason})"));
            }
        },
        Ok(None) => {
            info!("no fix proposed; attempt spent");
            state.add_note(format!("attempt {attempt}: advisory model proposed no fix"));
        }
        Err(err) => {
            warn!(err = %settings.describe(&err), "advisory model unavailable; attempt spent");
            state.add_note(format!(
                "attempt {attempt}: advisory model unavailable during troubleshoot"
            ));
        }
    }
    NodeResult::Advance(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Transform, Verification};
    use crate::test_support::{ScriptedAdvisor, seeded_state};

    fn failed_state(max_attempts: u32) -> RunState {
        let mut state = seeded_state(max_attempts);
        state.append_transform(Transform::named("org.openrewrite.java.migrate.UpgradeToJava17"));
        state.record_verification(Verification::failure("[ERROR] package javax.servlet does not exist"));
        state
    }

    #[test]
    fn appends_fix_and_records_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let advisor = ScriptedAdvisor::new();
        advisor.push_fix(Some(Transform::named(
            "org.openrewrite.java.migrate.jakarta.JavaxMigrationToJakarta",
        )));
        let NodeResult::Advance(state) =
            run(failed_state(3), &advisor, &RunSettings::new(temp.path()))
        else {
            panic!("expected advance");
        };
        assert_eq!(state.attempt_count(), 1);
        assert_eq!(state.transform_plan().len(), 2);
        assert_eq!(state.error_history().len(), 1);
        assert!(state.error_history()[0].diagnostic_text.contains("javax.servlet"));
        assert_eq!(advisor.fix_diagnostics(), vec!["[ERROR] package javax.servlet does not exist".to_string()]);
    }

    #[test]
    fn advisor_failure_still_burns_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let advisor = ScriptedAdvisor::new();
        advisor.fail_fix("503 Service Unavailable");
        let NodeResult::Advance(state) =
            run(failed_state(3), &advisor, &RunSettings::new(temp.path()))
        else {
            panic!("expected advance");
        };
        assert_eq!(state.attempt_count(), 1);
        assert_eq!(state.transform_plan().len(), 1);
        assert!(state.notes()[0].contains("unavailable"));
    }

    #[test]
    fn definition_for_other_recipe_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let advisor = ScriptedAdvisor::new();
        advisor.push_fix(Some(Transform {
            definition: Some(
                "type: specs.openrewrite.org/v1beta/recipe\nname: upgrader.fix.Other\n".to_string(),
            ),
            ..Transform::named("upgrader.fix.Mine")
        }));
        let NodeResult::Advance(state) =
            run(failed_state(3), &advisor, &RunSettings::new(temp.path()))
        else {
            panic!("expected advance");
        };
        assert_eq!(state.transform_plan().len(), 1);
        assert!(state.notes()[0].contains("rejected"));
    }

    #[test]
    fn writes_attempt_artifact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let advisor = ScriptedAdvisor::new();
        let settings = RunSettings {
            artifacts: Some(
                crate::io::artifacts::ArtifactWriter::new(temp.path().join("artifacts"))
                    .expect("writer"),
            ),
            ..RunSettings::new(temp.path())
        };
        let _ = run(failed_state(3), &advisor, &settings);
        assert!(temp.path().join("artifacts/attempt-1/diagnostic.log").is_file());
    }
}
