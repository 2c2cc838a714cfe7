//! CLI tests for invocations that never start a run.
//!
//! Spawns the upgrader binary and checks the exit code and the JSON report
//! printed on stdout.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

use upgrader::exit_codes;

fn upgrader(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_upgrader"));
    cmd.current_dir(dir)
        .args([
            "--repository-url",
            "https://github.com/acme/shop.git",
            "--base-branch",
            "main",
        ])
        .args(args)
        .env_remove("UPGRADER_REPOSITORY_URL")
        .env_remove("UPGRADER_BASE_BRANCH")
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "off");
    cmd
}

fn report(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().last().expect("stdout report line");
    serde_json::from_str(line).expect("report json")
}

#[test]
fn missing_hosting_token_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = upgrader(temp.path(), &[])
        .env_remove("GITHUB_TOKEN")
        .output()
        .expect("run upgrader");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let report = report(&output);
    assert!(report["pull_request_url"].is_null());
    let summary = report["summary_report"].as_str().expect("summary");
    assert!(summary.contains("GITHUB_TOKEN is not set"));
}

#[test]
fn zero_attempts_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = upgrader(temp.path(), &["--max-attempts", "0"])
        .env("GITHUB_TOKEN", "ghp_test")
        .output()
        .expect("run upgrader");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(report(&output)["pull_request_url"].is_null());
}

#[test]
fn malformed_branch_override_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = upgrader(temp.path(), &["--new-branch-name", "bad..name"])
        .env("GITHUB_TOKEN", "ghp_test")
        .output()
        .expect("run upgrader");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let summary = report(&output)["summary_report"]
        .as_str()
        .expect("summary")
        .to_string();
    assert!(summary.contains("--new-branch-name"));
    assert!(!summary.contains("ghp_test"));
}

#[test]
fn invalid_config_file_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("upgrader.toml"), "max_attempts = \"many\"\n")
        .expect("write config");
    let output = upgrader(temp.path(), &[])
        .env("GITHUB_TOKEN", "ghp_test")
        .output()
        .expect("run upgrader");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}
