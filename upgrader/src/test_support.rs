//! Test-only helpers: deterministic run seeds and scripted collaborators.
//!
//! Each fake replays a queue of scripted replies and falls back to the happy
//! path when the queue is empty. Interior mutability keeps the trait methods
//! `&self`, matching the real adapters.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::state::{RunSeed, RunState};
use crate::core::types::{BuildDescriptor, BuildSystem, ProjectVersions, Transform, Verification};
use crate::io::advisor::{Advisor, FixRequest, PlanRequest, UpgradePlan};
use crate::io::build::BuildTool;
use crate::io::git::Vcs;
use crate::io::hosting::{CodeHost, PullRequest};
use crate::io::transform::{ApplyReport, TransformEngine};
use crate::nodes::setup::RunRequest;

pub const REPOSITORY_URL: &str = "https://github.com/acme/shop.git";
pub const PR_URL: &str = "https://github.com/acme/shop/pull/1";
pub const JAVA17: &str = "org.openrewrite.java.migrate.UpgradeToJava17";

/// Deterministic seed for a run on `main`.
pub fn test_seed(max_attempts: u32) -> RunSeed {
    RunSeed {
        repository_url: REPOSITORY_URL.to_string(),
        base_branch: "main".to_string(),
        working_branch: "upgrade-java-springboot-latest-main-20260101T000000Z-0000".to_string(),
        workdir: PathBuf::from("/tmp/upgrader-test/repo"),
        target_version: None,
        max_attempts,
    }
}

/// Fresh state straight out of Setup.
pub fn seeded_state(max_attempts: u32) -> RunState {
    RunState::new(test_seed(max_attempts))
}

pub fn test_request(max_attempts: u32) -> RunRequest {
    RunRequest {
        repository_url: REPOSITORY_URL.to_string(),
        base_branch: "main".to_string(),
        target_version: None,
        max_attempts,
        new_branch_name: None,
    }
}

/// Scripted [`Vcs`]: counts calls, fails on request.
#[derive(Debug, Default)]
pub struct ScriptedVcs {
    clone_error: RefCell<Option<String>>,
    branch_error: RefCell<Option<String>>,
    push_error: RefCell<Option<String>>,
    nothing_to_commit: Cell<bool>,
    clones: Cell<usize>,
    branches: Cell<usize>,
    commits: Cell<usize>,
    pushes: Cell<usize>,
}

impl ScriptedVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_clone(&self, message: &str) {
        *self.clone_error.borrow_mut() = Some(message.to_string());
    }

    pub fn fail_branch(&self, message: &str) {
        *self.branch_error.borrow_mut() = Some(message.to_string());
    }

    pub fn fail_push(&self, message: &str) {
        *self.push_error.borrow_mut() = Some(message.to_string());
    }

    /// Make `commit_all` report a clean tree.
    pub fn commit_nothing(&self) {
        self.nothing_to_commit.set(true);
    }

    pub fn clones(&self) -> usize {
        self.clones.get()
    }

    pub fn branches_created(&self) -> usize {
        self.branches.get()
    }

    pub fn commits(&self) -> usize {
        self.commits.get()
    }

    pub fn pushes(&self) -> usize {
        self.pushes.get()
    }
}

impl Vcs for ScriptedVcs {
    fn clone_repo(&self, _url: &str, _base_branch: &str, dest: &Path) -> Result<()> {
        self.clones.set(self.clones.get() + 1);
        if let Some(message) = self.clone_error.borrow().as_ref() {
            return Err(anyhow!("{message}"));
        }
        fs::create_dir_all(dest)?;
        Ok(())
    }

    fn create_branch(&self, _workdir: &Path, _branch: &str) -> Result<()> {
        if let Some(message) = self.branch_error.borrow().as_ref() {
            return Err(anyhow!("{message}"));
        }
        self.branches.set(self.branches.get() + 1);
        Ok(())
    }

    fn commit_all(&self, _workdir: &Path, _message: &str) -> Result<bool> {
        self.commits.set(self.commits.get() + 1);
        Ok(!self.nothing_to_commit.get())
    }

    fn push(&self, _workdir: &Path, _branch: &str) -> Result<()> {
        if let Some(message) = self.push_error.borrow().as_ref() {
            return Err(anyhow!("{message}"));
        }
        self.pushes.set(self.pushes.get() + 1);
        Ok(())
    }
}

/// Scripted [`BuildTool`]: fixed descriptors and versions, queued
/// verification results (green once the queue runs dry).
#[derive(Debug)]
pub struct ScriptedBuildTool {
    descriptors: Vec<BuildDescriptor>,
    versions: RefCell<Result<ProjectVersions, String>>,
    verifications: RefCell<VecDeque<Result<Verification, String>>>,
    verify_calls: Cell<usize>,
}

impl ScriptedBuildTool {
    pub fn with_descriptors(descriptors: Vec<BuildDescriptor>) -> Self {
        Self {
            descriptors,
            versions: RefCell::new(Ok(ProjectVersions {
                java: Some("11".to_string()),
                spring_boot: Some("2.7.18".to_string()),
            })),
            verifications: RefCell::new(VecDeque::new()),
            verify_calls: Cell::new(0),
        }
    }

    pub fn maven() -> Self {
        Self::with_descriptors(vec![BuildDescriptor {
            build_system: BuildSystem::Maven,
            file: "pom.xml".to_string(),
        }])
    }

    pub fn gradle() -> Self {
        Self::with_descriptors(vec![BuildDescriptor {
            build_system: BuildSystem::Gradle,
            file: "build.gradle".to_string(),
        }])
    }

    pub fn fail_versions(&self, message: &str) {
        *self.versions.borrow_mut() = Err(message.to_string());
    }

    pub fn push_verification(&self, verification: Verification) {
        self.verifications.borrow_mut().push_back(Ok(verification));
    }

    /// Queue `count` red builds with numbered diagnostics.
    pub fn push_failures(&self, count: usize) {
        for n in 1..=count {
            self.push_verification(Verification::failure(format!("[ERROR] failure {n}")));
        }
    }

    pub fn fail_verify(&self, message: &str) {
        self.verifications
            .borrow_mut()
            .push_back(Err(message.to_string()));
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.get()
    }
}

impl BuildTool for ScriptedBuildTool {
    fn detect(&self, _workdir: &Path) -> Result<Vec<BuildDescriptor>> {
        Ok(self.descriptors.clone())
    }

    fn read_versions(&self, _workdir: &Path, _build_system: BuildSystem) -> Result<ProjectVersions> {
        self.versions.borrow().clone().map_err(|message| anyhow!(message))
    }

    fn verify(
        &self,
        _workdir: &Path,
        _build_system: BuildSystem,
        _timeout: Duration,
    ) -> Result<Verification> {
        self.verify_calls.set(self.verify_calls.get() + 1);
        match self.verifications.borrow_mut().pop_front() {
            Some(Ok(verification)) => Ok(verification),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Verification::success()),
        }
    }
}

#[derive(Debug, Clone)]
enum EngineStep {
    Fail(String),
    TimeOut,
}

/// Scripted [`TransformEngine`]: records the plan length of every call and
/// reports every distinct plan entry as applied.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    steps: RefCell<VecDeque<EngineStep>>,
    calls: RefCell<Vec<usize>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, message: &str) {
        self.steps
            .borrow_mut()
            .push_back(EngineStep::Fail(message.to_string()));
    }

    pub fn time_out_next(&self) {
        self.steps.borrow_mut().push_back(EngineStep::TimeOut);
    }

    /// Plan length passed on each call, in call order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.borrow().clone()
    }
}

impl TransformEngine for ScriptedEngine {
    fn apply(
        &self,
        _workdir: &Path,
        _build_system: BuildSystem,
        plan: &[Transform],
        _timeout: Duration,
    ) -> Result<ApplyReport> {
        self.calls.borrow_mut().push(plan.len());
        match self.steps.borrow_mut().pop_front() {
            Some(EngineStep::Fail(message)) => Err(anyhow!(message)),
            Some(EngineStep::TimeOut) => Ok(ApplyReport {
                applied: Vec::new(),
                timed_out: true,
                output: "Running recipe...".to_string(),
            }),
            None => {
                let mut applied: Vec<String> = Vec::new();
                for transform in plan {
                    if !applied.contains(&transform.name) {
                        applied.push(transform.name.clone());
                    }
                }
                Ok(ApplyReport {
                    applied,
                    timed_out: false,
                    output: String::new(),
                })
            }
        }
    }
}

/// Scripted [`Advisor`]: one plan reply, queued fix replies (no fix once the
/// queue runs dry).
#[derive(Debug)]
pub struct ScriptedAdvisor {
    plan: RefCell<Result<UpgradePlan, String>>,
    fixes: RefCell<VecDeque<Result<Option<Transform>, String>>>,
    plan_calls: Cell<usize>,
    fix_diagnostics: RefCell<Vec<String>>,
}

impl Default for ScriptedAdvisor {
    fn default() -> Self {
        Self {
            plan: RefCell::new(Ok(UpgradePlan {
                transforms: vec![Transform::named(JAVA17)],
                target_version: None,
                rationale: Some("Move to Java 17 first.".to_string()),
            })),
            fixes: RefCell::new(VecDeque::new()),
            plan_calls: Cell::new(0),
            fix_diagnostics: RefCell::new(Vec::new()),
        }
    }
}

impl ScriptedAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_with(&self, transforms: Vec<Transform>) {
        *self.plan.borrow_mut() = Ok(UpgradePlan {
            transforms,
            target_version: None,
            rationale: None,
        });
    }

    pub fn plan_reply(&self, plan: UpgradePlan) {
        *self.plan.borrow_mut() = Ok(plan);
    }

    pub fn fail_plan(&self, message: &str) {
        *self.plan.borrow_mut() = Err(message.to_string());
    }

    pub fn push_fix(&self, fix: Option<Transform>) {
        self.fixes.borrow_mut().push_back(Ok(fix));
    }

    pub fn fail_fix(&self, message: &str) {
        self.fixes.borrow_mut().push_back(Err(message.to_string()));
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.get()
    }

    pub fn fix_calls(&self) -> usize {
        self.fix_diagnostics.borrow().len()
    }

    /// Diagnostic text passed to each fix request, in call order.
    pub fn fix_diagnostics(&self) -> Vec<String> {
        self.fix_diagnostics.borrow().clone()
    }
}

impl Advisor for ScriptedAdvisor {
    fn plan_upgrade(&self, _request: &PlanRequest<'_>) -> Result<UpgradePlan> {
        self.plan_calls.set(self.plan_calls.get() + 1);
        self.plan.borrow().clone().map_err(|message| anyhow!(message))
    }

    fn synthesize_fix(&self, request: &FixRequest<'_>) -> Result<Option<Transform>> {
        self.fix_diagnostics
            .borrow_mut()
            .push(request.diagnostic_text.to_string());
        match self.fixes.borrow_mut().pop_front() {
            Some(Ok(fix)) => Ok(fix),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(None),
        }
    }
}

/// Scripted [`CodeHost`]: returns [`PR_URL`] and keeps titles and bodies.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    error: RefCell<Option<String>>,
    titles: RefCell<Vec<String>>,
    bodies: RefCell<Vec<String>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, message: &str) {
        *self.error.borrow_mut() = Some(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.titles.borrow().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.titles.borrow().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.borrow().clone()
    }
}

impl CodeHost for ScriptedHost {
    fn open_pull_request(&self, request: &PullRequest<'_>) -> Result<String> {
        self.titles.borrow_mut().push(request.title.to_string());
        self.bodies.borrow_mut().push(request.body.to_string());
        if let Some(message) = self.error.borrow().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(PR_URL.to_string())
    }
}
