//! Setup: working copy and working branch.

use chrono::Utc;
use tracing::{info, instrument};

use crate::core::branch::{derive_branch_name, validate_branch_name};
use crate::core::state::{RunSeed, RunState};
use crate::io::git::Vcs;
use crate::nodes::{FatalError, RunSettings};

/// Directory under the scratch dir that receives the clone.
pub const REPO_DIR: &str = "repo";

/// Caller-supplied run identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub repository_url: String,
    pub base_branch: String,
    pub target_version: Option<String>,
    pub max_attempts: u32,
    /// Overrides the derived working-branch name.
    pub new_branch_name: Option<String>,
}

/// Pick the working-branch name: the validated override, or a derived one.
pub fn working_branch_name(request: &RunRequest) -> Result<String, FatalError> {
    match &request.new_branch_name {
        Some(name) => {
            validate_branch_name(name).map_err(FatalError::InvalidBranch)?;
            Ok(name.clone())
        }
        None => {
            let name = derive_branch_name(
                request.target_version.as_deref(),
                &request.base_branch,
                Utc::now(),
                rand::random::<u16>(),
            );
            validate_branch_name(&name).map_err(FatalError::InvalidBranch)?;
            Ok(name)
        }
    }
}

/// Clone at the base branch and create the working branch.
///
/// Every failure is fatal; there is no state to report yet.
#[instrument(skip_all, fields(base = %request.base_branch))]
pub fn run<V: Vcs>(
    vcs: &V,
    request: &RunRequest,
    settings: &RunSettings,
) -> Result<RunState, FatalError> {
    let working_branch = working_branch_name(request)?;
    let workdir = settings.scratch_dir.join(REPO_DIR);

    vcs.clone_repo(&request.repository_url, &request.base_branch, &workdir)
        .map_err(|err| FatalError::Setup(settings.describe(&err)))?;
    vcs.create_branch(&workdir, &working_branch)
        .map_err(|err| FatalError::Setup(settings.describe(&err)))?;
    info!(branch = %working_branch, workdir = %workdir.display(), "working copy ready");

    Ok(RunState::new(RunSeed {
        repository_url: request.repository_url.clone(),
        base_branch: request.base_branch.clone(),
        working_branch,
        workdir,
        target_version: request.target_version.clone(),
        max_attempts: request.max_attempts,
    }))
}
