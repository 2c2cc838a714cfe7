//! Human-readable rendering of a run: summary report, commit message and
//! pull-request text.

use std::fmt::Write as _;

use crate::core::diagnostics::last_lines;
use crate::core::state::RunState;
use crate::core::types::{ProjectVersions, TerminalOutcome, VerificationStatus};

/// Lines of each error-history entry kept in the summary report.
const HISTORY_LINES: usize = 20;

/// What Finalize learned while resolving its side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub pull_request_url: Option<String>,
    /// Why no pull request exists, when none does.
    pub pull_request_note: Option<String>,
    pub abort_reason: Option<String>,
}

pub fn summary_report(state: &RunState, ctx: &ReportContext) -> String {
    let mut out = String::new();
    let outcome = state
        .terminal_outcome()
        .map_or("unassigned", TerminalOutcome::as_str);
    let _ = writeln!(out, "Outcome: {outcome}");
    let _ = writeln!(out, "Repository: {}", state.repository_url());
    let _ = writeln!(
        out,
        "Branch: {} (from {})",
        state.working_branch(),
        state.base_branch()
    );
    let _ = writeln!(out, "Build system: {}", state.build_system());
    let _ = writeln!(
        out,
        "Current versions: Java {}, Spring Boot {}",
        state.versions().java_or_unknown(),
        state.versions().spring_boot_or_unknown()
    );
    let _ = writeln!(
        out,
        "Target version: {}",
        state.target_version().unwrap_or("latest stable")
    );
    let _ = writeln!(
        out,
        "Attempts: {} of {}",
        state.attempt_count(),
        state.max_attempts()
    );
    match state.last_verification() {
        Some(verification) => {
            let status = match verification.status {
                VerificationStatus::Success => "success",
                VerificationStatus::Failure => "failure",
            };
            let timed_out = if verification.timed_out { " (timed out)" } else { "" };
            let _ = writeln!(out, "Last verification: {status}{timed_out}");
        }
        None => {
            let _ = writeln!(out, "Last verification: not run");
        }
    }

    let _ = writeln!(out, "Transform plan ({}):", state.transform_plan().len());
    if state.transform_plan().is_empty() {
        let _ = writeln!(out, "  (empty)");
    }
    for (idx, transform) in state.transform_plan().iter().enumerate() {
        let _ = writeln!(out, "  {}. {transform}", idx + 1);
    }
    if !state.applied().is_empty() {
        let _ = writeln!(
            out,
            "Applied by engine on last run: {}",
            state.applied().len()
        );
    }

    if !state.error_history().is_empty() {
        let _ = writeln!(out, "Error history:");
        for record in state.error_history() {
            let _ = writeln!(out, "  attempt {}:", record.attempt);
            for line in last_lines(&record.diagnostic_text, HISTORY_LINES).lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
    }
    if !state.notes().is_empty() {
        let _ = writeln!(out, "Notes:");
        for note in state.notes() {
            let _ = writeln!(out, "  - {note}");
        }
    }
    if let Some(reason) = &ctx.abort_reason {
        let _ = writeln!(out, "Abort reason: {reason}");
    }
    match (&ctx.pull_request_url, &ctx.pull_request_note) {
        (Some(url), _) => {
            let _ = writeln!(out, "Pull request: {url}");
        }
        (None, Some(note)) => {
            let _ = writeln!(out, "Pull request: not created ({note})");
        }
        (None, None) => {
            let _ = writeln!(out, "Pull request: not created");
        }
    }
    out.trim_end().to_string()
}

/// Report for a run that never got past Setup, so no run state exists.
pub fn setup_failure_report(repository_url: &str, base_branch: &str, reason: &str) -> String {
    format!(
        "Outcome: {}\nRepository: {repository_url}\nBase branch: {base_branch}\n\
         Abort reason: {reason}\nPull request: not created (setup failed)",
        TerminalOutcome::Aborted.as_str()
    )
}

pub fn commit_message(state: &RunState) -> String {
    format!(
        "chore(upgrade): Java {} / Spring Boot {} -> {}",
        state.versions().java_or_unknown(),
        state.versions().spring_boot_or_unknown(),
        state.target_version().unwrap_or("latest")
    )
}

/// Title naming what moved: Java and/or Spring Boot, with the target attached
/// to whichever one the target mentions.
pub fn pull_request_title(versions: &ProjectVersions, target_version: Option<&str>) -> String {
    let target_lower = target_version.map(str::to_lowercase);
    let mentions = |needle: &str| {
        target_lower
            .as_deref()
            .is_some_and(|target| target.contains(needle))
    };
    let mut parts = Vec::new();
    if let Some(java) = &versions.java {
        match target_version {
            Some(target) if mentions("java") => {
                parts.push(format!("Upgrade Java from {java} to {target}"));
            }
            _ => parts.push(format!("Upgrade Java from {java}")),
        }
    }
    if let Some(boot) = &versions.spring_boot {
        match target_version {
            Some(target) if mentions("spring") => {
                parts.push(format!("Upgrade Spring Boot from {boot} to {target}"));
            }
            _ => parts.push(format!("Upgrade Spring Boot from {boot}")),
        }
    }
    if parts.is_empty() {
        return match target_version {
            Some(target) => format!("Automated upgrade to {target}"),
            None => "Automated project upgrade".to_string(),
        };
    }
    parts.join(" and ")
}

/// Pull-request body for the outcome Finalize is about to claim.
pub fn pull_request_body(state: &RunState, outcome: TerminalOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Automated Java/Spring Boot upgrade\n");
    let _ = writeln!(
        out,
        "Outcome: **{outcome}** after {} of {} repair attempts.\n",
        state.attempt_count(),
        state.max_attempts()
    );
    let _ = writeln!(out, "### Transform plan\n");
    if state.transform_plan().is_empty() {
        let _ = writeln!(out, "- No transforms were planned");
    }
    for transform in state.transform_plan() {
        let _ = writeln!(out, "- `{transform}`");
    }
    if let Some(rationale) = state.rationale() {
        let _ = writeln!(out, "\n### Rationale\n\n{}", rationale.trim());
    }
    if !state.error_history().is_empty() {
        let _ = writeln!(
            out,
            "\n### Build failures\n\n{} failing verification(s) were fed back into repair attempts.",
            state.error_history().len()
        );
    }
    if outcome == TerminalOutcome::BestEffort {
        if let Some(verification) = state.last_verification() {
            let _ = writeln!(
                out,
                "\n### Last build output\n\n```\n{}\n```",
                last_lines(&verification.diagnostic_text, HISTORY_LINES)
            );
        }
    }

    let _ = writeln!(out, "\n### Review checklist\n");
    if outcome == TerminalOutcome::MergedCandidate {
        let _ = writeln!(out, "- [x] Build and tests passed in the upgrade run");
    } else {
        let _ = writeln!(
            out,
            "- [ ] Build is still failing: the attempt budget ran out before a green build"
        );
    }
    let _ = writeln!(out, "- [ ] Review the diff carefully before merging");
    let _ = writeln!(out, "- [ ] Check the migration guides for breaking changes");
    let _ = writeln!(out, "- [ ] Run any manual or environment-specific tests");
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BuildSystem, Transform, Verification};
    use crate::test_support::seeded_state;

    fn versions(java: Option<&str>, boot: Option<&str>) -> ProjectVersions {
        ProjectVersions {
            java: java.map(str::to_string),
            spring_boot: boot.map(str::to_string),
        }
    }

    #[test]
    fn title_attaches_target_to_mentioned_component() {
        let v = versions(Some("11"), Some("2.7.18"));
        assert_eq!(
            pull_request_title(&v, Some("Spring Boot 3.2")),
            "Upgrade Java from 11 and Upgrade Spring Boot from 2.7.18 to Spring Boot 3.2"
        );
        assert_eq!(
            pull_request_title(&v, Some("Java 21")),
            "Upgrade Java from 11 to Java 21 and Upgrade Spring Boot from 2.7.18"
        );
    }

    #[test]
    fn title_without_versions_falls_back() {
        let v = versions(None, None);
        assert_eq!(pull_request_title(&v, Some("3.2")), "Automated upgrade to 3.2");
        assert_eq!(pull_request_title(&v, None), "Automated project upgrade");
    }

    #[test]
    fn commit_message_uses_unknown_and_latest() {
        let state = seeded_state(2);
        assert_eq!(
            commit_message(&state),
            "chore(upgrade): Java unknown / Spring Boot unknown -> latest"
        );
    }

    #[test]
    fn best_effort_body_does_not_claim_green_build() {
        let mut state = seeded_state(1);
        state.append_transform(Transform::named("org.openrewrite.java.migrate.UpgradeToJava17"));
        state.record_verification(Verification::failure("[ERROR] cannot find symbol"));
        let body = pull_request_body(&state, TerminalOutcome::BestEffort);
        assert!(body.contains("Build is still failing"));
        assert!(!body.contains("[x] Build and tests passed"));
        assert!(body.contains("cannot find symbol"));

        let green = pull_request_body(&state, TerminalOutcome::MergedCandidate);
        assert!(green.contains("[x] Build and tests passed"));
    }

    #[test]
    fn summary_lists_plan_history_and_pr_absence() {
        let mut state = seeded_state(3);
        state.complete_analysis(BuildSystem::Maven, versions(Some("11"), None), None);
        state.append_transform(Transform::named("a.First"));
        state.append_transform(Transform::named("a.First"));
        state.record_verification(Verification::failure("line1\nline2"));
        let attempt = state.begin_attempt();
        state.record_error(attempt, "line1\nline2".to_string());
        state.add_note("advisor unavailable during troubleshoot");
        state
            .assign_outcome(TerminalOutcome::Aborted)
            .expect("assign");
        let report = summary_report(
            &state,
            &ReportContext {
                pull_request_note: Some("push failed".to_string()),
                abort_reason: Some("push failed".to_string()),
                ..ReportContext::default()
            },
        );
        assert!(report.starts_with("Outcome: aborted"));
        assert!(report.contains("Build system: maven"));
        assert!(report.contains("Java 11, Spring Boot unknown"));
        assert!(report.contains("Transform plan (2):\n  1. a.First\n  2. a.First"));
        assert!(report.contains("  attempt 1:\n    line1\n    line2"));
        assert!(report.contains("  - advisor unavailable during troubleshoot"));
        assert!(report.contains("Abort reason: push failed"));
        assert!(report.ends_with("Pull request: not created (push failed)"));
    }

    #[test]
    fn setup_failure_report_names_reason() {
        let report = setup_failure_report("https://github.com/acme/shop.git", "main", "clone failed");
        assert!(report.starts_with("Outcome: aborted\nRepository: https://github.com/acme/shop.git"));
        assert!(report.contains("Abort reason: clone failed"));
        assert!(report.ends_with("not created (setup failed)"));
    }
}
