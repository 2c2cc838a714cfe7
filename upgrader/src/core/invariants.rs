//! Transition contract between consecutive node states.
//!
//! The driver snapshots the state before each node and checks the returned
//! state against it. Any violation is an integrity failure, never retried.

use crate::core::state::RunState;
use crate::core::types::NodeKind;

/// Check the node transition `prev -> next` performed by `node`:
/// - Setup identifiers and `max_attempts` never change.
/// - Build system, versions and target version only change in Analysis.
/// - The transform plan only grows and keeps its prefix; Troubleshoot adds at
///   most one entry, Analysis may seed many, other nodes add none.
/// - `attempt_count` changes only in Troubleshoot, by exactly one, and never
///   exceeds `max_attempts`.
/// - The error history is append-only and only Troubleshoot appends.
/// - `terminal_outcome` is set by Finalize and by nobody else.
///
/// These hold for every node result, fatal ones included.
/// Returns stable error messages in rule order.
pub fn check_transition(prev: &RunState, next: &RunState, node: NodeKind) -> Vec<String> {
    let mut errors = Vec::new();

    if prev.repository_url() != next.repository_url()
        || prev.base_branch() != next.base_branch()
        || prev.working_branch() != next.working_branch()
        || prev.workdir() != next.workdir()
    {
        errors.push(format!("{node}: setup identifiers changed"));
    }
    if prev.max_attempts() != next.max_attempts() {
        errors.push(format!(
            "{node}: max_attempts changed from {} to {}",
            prev.max_attempts(),
            next.max_attempts()
        ));
    }

    if node != NodeKind::Analysis
        && (prev.build_system() != next.build_system()
            || prev.versions() != next.versions()
            || prev.target_version() != next.target_version())
    {
        errors.push(format!("{node}: analysis results changed outside analysis"));
    }

    check_plan(prev, next, node, &mut errors);
    check_attempts(prev, next, node, &mut errors);

    let prev_history = prev.error_history();
    let next_history = next.error_history();
    if next_history.len() < prev_history.len()
        || next_history[..prev_history.len()] != *prev_history
    {
        errors.push(format!("{node}: error history rewritten"));
    } else {
        let added = next_history.len() - prev_history.len();
        let allowed = usize::from(node == NodeKind::Troubleshoot);
        if added > allowed {
            errors.push(format!("{node}: appended {added} error history entries"));
        }
    }

    match node {
        NodeKind::Finalize => {
            if next.terminal_outcome().is_none() {
                errors.push(format!("{node}: terminal outcome not assigned"));
            }
        }
        _ => {
            if next.terminal_outcome().is_some() {
                errors.push(format!("{node}: terminal outcome assigned outside finalize"));
            }
        }
    }

    errors
}

/// Output a node must leave behind when it completes without a fatal error.
/// Verify always records a verification.
pub fn check_node_output(next: &RunState, node: NodeKind) -> Vec<String> {
    let mut errors = Vec::new();
    if node == NodeKind::Verify && next.last_verification().is_none() {
        errors.push(format!("{node}: no verification recorded"));
    }
    errors
}

fn check_plan(prev: &RunState, next: &RunState, node: NodeKind, errors: &mut Vec<String>) {
    let before = prev.transform_plan();
    let after = next.transform_plan();
    if after.len() < before.len() {
        errors.push(format!(
            "{node}: transform plan shrank from {} to {}",
            before.len(),
            after.len()
        ));
        return;
    }
    if after[..before.len()] != *before {
        errors.push(format!("{node}: transform plan prefix rewritten"));
        return;
    }
    let added = after.len() - before.len();
    let allowed = match node {
        NodeKind::Analysis => usize::MAX,
        NodeKind::Troubleshoot => 1,
        _ => 0,
    };
    if added > allowed {
        errors.push(format!("{node}: appended {added} transforms"));
    }
}

fn check_attempts(prev: &RunState, next: &RunState, node: NodeKind, errors: &mut Vec<String>) {
    let expected = if node == NodeKind::Troubleshoot {
        prev.attempt_count() + 1
    } else {
        prev.attempt_count()
    };
    if next.attempt_count() != expected {
        errors.push(format!(
            "{node}: attempt_count moved from {} to {} (expected {expected})",
            prev.attempt_count(),
            next.attempt_count()
        ));
    }
    if next.attempt_count() > next.max_attempts() {
        errors.push(format!(
            "{node}: attempt_count {} exceeds max_attempts {}",
            next.attempt_count(),
            next.max_attempts()
        ));
    }
}
