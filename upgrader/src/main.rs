//! Java/Spring Boot upgrade runner.
//!
//! Clones the repository, runs the bounded transform/verify/repair loop and
//! prints one JSON object `{pull_request_url, summary_report}` on stdout.
//! Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use serde::Serialize;
use tracing::{info, warn};

use upgrader::cancel::{CancelToken, install_ctrl_c};
use upgrader::core::branch::validate_branch_name;
use upgrader::core::types::TerminalOutcome;
use upgrader::exit_codes;
use upgrader::io::advisor::OpenAiAdvisor;
use upgrader::io::artifacts::ArtifactWriter;
use upgrader::io::build::CommandBuildTool;
use upgrader::io::config::{DEFAULT_CONFIG_PATH, UpgraderConfig, load_config};
use upgrader::io::git::GitCli;
use upgrader::io::hosting::GitHubHost;
use upgrader::io::secrets::{ADVISOR_KEY_ENV, HOSTING_TOKEN_ENV, Secrets};
use upgrader::io::transform::RewriteEngine;
use upgrader::logging;
use upgrader::nodes::RunSettings;
use upgrader::nodes::setup::RunRequest;
use upgrader::workflow::Workflow;

#[derive(Parser, Debug)]
#[command(
    name = "upgrader",
    version,
    about = "Upgrade a Java/Spring Boot repository and open a pull request"
)]
struct Cli {
    /// Repository to clone (HTTPS or SSH URL).
    #[arg(long, env = "UPGRADER_REPOSITORY_URL")]
    repository_url: String,

    /// Branch to start from and target with the pull request.
    #[arg(long, env = "UPGRADER_BASE_BRANCH")]
    base_branch: String,

    /// Desired version, e.g. `3.2` or `Java 21`. Defaults to latest stable.
    #[arg(long)]
    target_version: Option<String>,

    /// Advisory model name (overrides `advisor.model`).
    #[arg(long)]
    llm_model: Option<String>,

    /// Repair attempt budget (overrides `max_attempts`, default 5).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Working branch name instead of the derived one.
    #[arg(long)]
    new_branch_name: Option<String>,

    /// Config file (TOML). `upgrader.toml` is used when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep the scratch workspace after the run.
    #[arg(long)]
    keep_workspace: bool,

    /// Write run artifacts to this directory.
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,
}

/// The single JSON object printed on stdout.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    pull_request_url: Option<&'a str>,
    summary_report: &'a str,
}

fn main() {
    logging::init();
    let code = match Cli::try_parse() {
        Ok(cli) => run(cli),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                eprint!("{err}");
                let first = err.to_string();
                let first = first.lines().next().unwrap_or("invalid arguments");
                invalid(&format!("invalid invocation: {first}"))
            }
        },
    };
    std::process::exit(code);
}

fn emit(pull_request_url: Option<&str>, summary_report: &str) {
    let report = RunReport {
        pull_request_url,
        summary_report,
    };
    match serde_json::to_string(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to serialize run report: {err}"),
    }
}

fn invalid(message: &str) -> i32 {
    emit(None, &format!("Outcome: not started\nReason: {message}"));
    exit_codes::INVALID
}

/// Resolve the effective configuration: file, then CLI overrides.
fn resolve_config(cli: &Cli) -> Result<UpgraderConfig> {
    let mut cfg = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(anyhow!("config file {} does not exist", path.display()));
        }
        Some(path) => load_config(path)?,
        None => load_config(&PathBuf::from(DEFAULT_CONFIG_PATH))?,
    };
    if let Some(model) = &cli.llm_model {
        cfg.advisor.model = model.clone();
    }
    if let Some(max_attempts) = cli.max_attempts {
        cfg.max_attempts = max_attempts;
    }
    cfg.keep_workspace |= cli.keep_workspace;
    if let Some(dir) = &cli.artifacts_dir {
        cfg.artifacts_dir = Some(dir.clone());
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn run(cli: Cli) -> i32 {
    let cfg = match resolve_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => return invalid(&format!("{err:#}")),
    };
    if cli.repository_url.trim().is_empty() || cli.base_branch.trim().is_empty() {
        return invalid("--repository-url and --base-branch must be non-empty");
    }
    if let Some(name) = &cli.new_branch_name {
        if let Err(reason) = validate_branch_name(name) {
            return invalid(&format!("--new-branch-name: {reason}"));
        }
    }

    let secrets = Secrets::from_env();
    let Some(token) = secrets.hosting_token.clone() else {
        return invalid(&format!("{HOSTING_TOKEN_ENV} is not set"));
    };
    if secrets.advisor_key.is_none() {
        warn!("{ADVISOR_KEY_ENV} is not set; planning and repairs will use fallbacks only");
    }

    let request = RunRequest {
        repository_url: cli.repository_url.trim().to_string(),
        base_branch: cli.base_branch.trim().to_string(),
        target_version: cli
            .target_version
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty()),
        max_attempts: cfg.max_attempts,
        new_branch_name: cli.new_branch_name,
    };

    let cancel = CancelToken::new();
    if let Err(err) = install_ctrl_c(cancel.clone()) {
        warn!(err = %format!("{err:#}"), "ctrl-c handling unavailable");
    }

    match execute(&cfg, &secrets, token, &request, cancel.clone()) {
        Ok((url, report, outcome)) => {
            emit(url.as_deref(), &report);
            match outcome {
                TerminalOutcome::Aborted if cancel.is_cancelled() => exit_codes::CANCELLED,
                TerminalOutcome::Aborted => exit_codes::ABORTED,
                TerminalOutcome::MergedCandidate | TerminalOutcome::BestEffort => exit_codes::OK,
            }
        }
        Err(err) => {
            let reason = secrets.redactor().redact(&format!("{err:#}"));
            emit(
                None,
                &format!("Outcome: aborted\nAbort reason: {reason}\nPull request: not created"),
            );
            exit_codes::ABORTED
        }
    }
}

/// Build the collaborators inside a fresh scratch workspace and run once.
fn execute(
    cfg: &UpgraderConfig,
    secrets: &Secrets,
    token: upgrader::io::secrets::Secret,
    request: &RunRequest,
    cancel: CancelToken,
) -> Result<(Option<String>, String, TerminalOutcome)> {
    let scratch = tempfile::Builder::new()
        .prefix("upgrader-")
        .keep(cfg.keep_workspace)
        .tempdir()
        .context("create scratch workspace")?;
    let limit = cfg.diagnostic_limit_bytes;

    let vcs = GitCli::new(&cfg.git, cfg.vcs_timeout(), Some(token.clone()), scratch.path())?;
    let build = CommandBuildTool::new(&cfg.build, limit);
    let engine = RewriteEngine::new(&cfg.transform, scratch.path().join("engine"), limit);
    let advisor = OpenAiAdvisor::new(&cfg.advisor, secrets.advisor_key.clone())?;
    let host = GitHubHost::new(&cfg.hosting, token)?;

    let artifacts = match &cfg.artifacts_dir {
        Some(dir) => Some(ArtifactWriter::new(dir)?),
        None => None,
    };
    let settings = RunSettings {
        scratch_dir: scratch.path().to_path_buf(),
        verify_timeout: cfg.verify_timeout(),
        transform_timeout: cfg.transform_timeout(),
        diagnostic_limit_bytes: limit,
        redactor: secrets.redactor(),
        artifacts,
        cancel,
    };

    let workflow = Workflow::new(&vcs, &build, &engine, &advisor, &host, settings);
    let outcome = workflow.run(request);
    if cfg.keep_workspace {
        info!(path = %scratch.path().display(), "scratch workspace kept");
    }
    Ok((
        outcome.pull_request_url,
        outcome.summary_report,
        outcome.terminal_outcome,
    ))
}
