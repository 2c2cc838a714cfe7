//! The single run record threaded through every workflow node.
//!
//! Fields are read through accessors; writes go through narrow crate-private
//! mutators so that append-only and set-once fields cannot be rewritten by a
//! node that merely holds the state.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::core::types::{
    BuildSystem, ErrorRecord, ProjectVersions, TerminalOutcome, Transform, Verification,
};

/// Identifiers fixed by Setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSeed {
    pub repository_url: String,
    pub base_branch: String,
    pub working_branch: String,
    pub workdir: PathBuf,
    pub target_version: Option<String>,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("terminal outcome already assigned ({existing})")]
pub struct OutcomeAlreadyAssigned {
    pub existing: TerminalOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    repository_url: String,
    base_branch: String,
    working_branch: String,
    workdir: PathBuf,
    target_version: Option<String>,
    build_system: BuildSystem,
    versions: ProjectVersions,
    transform_plan: Vec<Transform>,
    applied: Vec<String>,
    attempt_count: u32,
    max_attempts: u32,
    last_verification: Option<Verification>,
    error_history: Vec<ErrorRecord>,
    rationale: Option<String>,
    notes: Vec<String>,
    terminal_outcome: Option<TerminalOutcome>,
}

impl RunState {
    pub fn new(seed: RunSeed) -> Self {
        Self {
            repository_url: seed.repository_url,
            base_branch: seed.base_branch,
            working_branch: seed.working_branch,
            workdir: seed.workdir,
            target_version: seed.target_version,
            build_system: BuildSystem::Unknown,
            versions: ProjectVersions::default(),
            transform_plan: Vec::new(),
            applied: Vec::new(),
            attempt_count: 0,
            max_attempts: seed.max_attempts,
            last_verification: None,
            error_history: Vec::new(),
            rationale: None,
            notes: Vec::new(),
            terminal_outcome: None,
        }
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    pub fn working_branch(&self) -> &str {
        &self.working_branch
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn target_version(&self) -> Option<&str> {
        self.target_version.as_deref()
    }

    pub fn build_system(&self) -> BuildSystem {
        self.build_system
    }

    pub fn versions(&self) -> &ProjectVersions {
        &self.versions
    }

    pub fn transform_plan(&self) -> &[Transform] {
        &self.transform_plan
    }

    /// Transform ids the engine reported as applied on its most recent run.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    pub fn last_verification(&self) -> Option<&Verification> {
        self.last_verification.as_ref()
    }

    pub fn error_history(&self) -> &[ErrorRecord] {
        &self.error_history
    }

    /// Advisor narrative attached to the upgrade plan, if any.
    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    /// Degraded-mode events worth surfacing to the reviewer.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn terminal_outcome(&self) -> Option<TerminalOutcome> {
        self.terminal_outcome
    }

    /// Record Analysis results. A user-supplied target version always wins over
    /// an inferred one.
    pub(crate) fn complete_analysis(
        &mut self,
        build_system: BuildSystem,
        versions: ProjectVersions,
        inferred_target: Option<String>,
    ) {
        self.build_system = build_system;
        self.versions = versions;
        if self.target_version.is_none() {
            self.target_version = inferred_target;
        }
    }

    pub(crate) fn append_transform(&mut self, transform: Transform) {
        self.transform_plan.push(transform);
    }

    pub(crate) fn record_applied(&mut self, applied: Vec<String>) {
        self.applied = applied;
    }

    pub(crate) fn record_verification(&mut self, verification: Verification) {
        self.last_verification = Some(verification);
    }

    /// Start a troubleshoot attempt. Returns the new attempt number (1-indexed).
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    pub(crate) fn record_error(&mut self, attempt: u32, diagnostic_text: String) {
        self.error_history.push(ErrorRecord {
            attempt,
            diagnostic_text,
        });
    }

    pub(crate) fn set_rationale(&mut self, rationale: String) {
        self.rationale = Some(rationale);
    }

    pub(crate) fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub(crate) fn assign_outcome(
        &mut self,
        outcome: TerminalOutcome,
    ) -> Result<(), OutcomeAlreadyAssigned> {
        if let Some(existing) = self.terminal_outcome {
            return Err(OutcomeAlreadyAssigned { existing });
        }
        self.terminal_outcome = Some(outcome);
        Ok(())
    }
}
