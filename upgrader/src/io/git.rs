//! Git adapter for the upgrade workflow.
//!
//! A small, explicit wrapper around `git` subprocess calls. Every call is
//! bounded by the configured VCS timeout; credentials reach git through an
//! askpass helper and the child environment, never through argv.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::diagnostics::Redactor;
use crate::io::config::GitConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};
use crate::io::secrets::Secret;

const GIT_OUTPUT_LIMIT: usize = 64 * 1024;
const TOKEN_ENV: &str = "UPGRADER_GIT_TOKEN";
const ASKPASS_SCRIPT: &str = "#!/bin/sh\n\
case \"$1\" in\n\
  Username*) echo x-access-token ;;\n\
  *) echo \"$UPGRADER_GIT_TOKEN\" ;;\n\
esac\n";

/// Source-control operations used by the workflow.
pub trait Vcs {
    /// Clone `url` with `base_branch` checked out into `dest`.
    fn clone_repo(&self, url: &str, base_branch: &str, dest: &Path) -> Result<()>;

    /// Create and check out `branch` from the current HEAD.
    ///
    /// Fails if the branch already exists locally or on the remote.
    fn create_branch(&self, workdir: &Path, branch: &str) -> Result<()>;

    /// Stage everything and commit. Returns `Ok(false)` when there was nothing
    /// to commit.
    fn commit_all(&self, workdir: &Path, message: &str) -> Result<bool>;

    /// Push `branch` to the remote.
    fn push(&self, workdir: &Path, branch: &str) -> Result<()>;
}

/// [`Vcs`] backed by the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitCli {
    remote: String,
    author_name: String,
    author_email: String,
    timeout: Duration,
    token: Option<Secret>,
    askpass: Option<PathBuf>,
    redactor: Redactor,
}

impl GitCli {
    /// Build the adapter. When a token is supplied an askpass helper is
    /// written into `scratch`.
    pub fn new(
        config: &GitConfig,
        timeout: Duration,
        token: Option<Secret>,
        scratch: &Path,
    ) -> Result<Self> {
        let askpass = match &token {
            Some(_) => Some(write_askpass(scratch)?),
            None => None,
        };
        let redactor = Redactor::new(token.iter().map(|t| t.expose().to_string()));
        Ok(Self {
            remote: config.remote.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            timeout,
            token,
            askpass,
            redactor,
        })
    }

    fn command(&self, workdir: Option<&Path>, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_AUTHOR_NAME", &self.author_name)
            .env("GIT_AUTHOR_EMAIL", &self.author_email)
            .env("GIT_COMMITTER_NAME", &self.author_name)
            .env("GIT_COMMITTER_EMAIL", &self.author_email);
        if let (Some(token), Some(askpass)) = (&self.token, &self.askpass) {
            cmd.env("GIT_ASKPASS", askpass).env(TOKEN_ENV, token.expose());
        }
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Argument list as it may appear in errors.
    fn shown(&self, args: &[&str]) -> String {
        self.redactor.redact(&args.join(" "))
    }

    fn run(&self, workdir: Option<&Path>, args: &[&str]) -> Result<CommandOutput> {
        let output = run_command_with_timeout(
            self.command(workdir, args),
            self.timeout,
            GIT_OUTPUT_LIMIT,
        )
        .with_context(|| format!("spawn git {}", self.shown(args)))?;
        if output.timed_out {
            return Err(anyhow!(
                "git {} timed out after {}s",
                self.shown(args),
                self.timeout.as_secs()
            ));
        }
        Ok(output)
    }

    fn run_checked(&self, workdir: Option<&Path>, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(workdir, args)?;
        if !output.status.success() {
            let stderr = self.redactor.redact(output.stderr_lossy().trim());
            return Err(anyhow!("git {} failed: {stderr}", self.shown(args)));
        }
        Ok(output)
    }

    fn local_branch_exists(&self, workdir: &Path, branch: &str) -> Result<bool> {
        let output = self.run(
            Some(workdir),
            &["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")],
        )?;
        Ok(output.status.success())
    }

    fn remote_branch_exists(&self, workdir: &Path, branch: &str) -> Result<bool> {
        let output = self.run(
            Some(workdir),
            &["ls-remote", "--exit-code", "--heads", &self.remote, branch],
        )?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            _ => Err(anyhow!(
                "git ls-remote {} failed: {}",
                self.remote,
                self.redactor.redact(output.stderr_lossy().trim())
            )),
        }
    }
}

impl Vcs for GitCli {
    #[instrument(skip_all, fields(base_branch))]
    fn clone_repo(&self, url: &str, base_branch: &str, dest: &Path) -> Result<()> {
        let dest_str = dest
            .to_str()
            .ok_or_else(|| anyhow!("clone destination is not valid UTF-8"))?;
        info!(dest = %dest.display(), "cloning repository");
        self.run_checked(
            None,
            &["clone", "--branch", base_branch, "--", url, dest_str],
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(branch))]
    fn create_branch(&self, workdir: &Path, branch: &str) -> Result<()> {
        if self.local_branch_exists(workdir, branch)? {
            return Err(anyhow!("branch '{branch}' already exists locally"));
        }
        if self.remote_branch_exists(workdir, branch)? {
            warn!(branch, "branch already exists on remote");
            return Err(anyhow!(
                "branch '{branch}' already exists on remote '{}'",
                self.remote
            ));
        }
        debug!(branch, "creating and checking out new branch");
        self.run_checked(Some(workdir), &["checkout", "-b", branch])?;
        Ok(())
    }

    #[instrument(skip_all)]
    fn commit_all(&self, workdir: &Path, message: &str) -> Result<bool> {
        self.run_checked(Some(workdir), &["add", "-A"])?;
        let staged = self.run_checked(Some(workdir), &["diff", "--cached", "--name-only"])?;
        let staged = staged.stdout_lossy();
        if staged.trim().is_empty() {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!(files = staged.lines().count(), "committing staged changes");
        self.run_checked(Some(workdir), &["commit", "--no-verify", "-m", message])?;
        Ok(true)
    }

    #[instrument(skip_all, fields(branch))]
    fn push(&self, workdir: &Path, branch: &str) -> Result<()> {
        info!(branch, remote = %self.remote, "pushing branch");
        self.run_checked(
            Some(workdir),
            &["push", "--set-upstream", &self.remote, branch],
        )?;
        Ok(())
    }
}

fn write_askpass(scratch: &Path) -> Result<PathBuf> {
    fs::create_dir_all(scratch)
        .with_context(|| format!("create scratch dir {}", scratch.display()))?;
    let path = scratch.join("git-askpass.sh");
    fs::write(&path, ASKPASS_SCRIPT).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(path)
}
