//! Upgrader configuration, optionally loaded from `upgrader.toml`.
//!
//! Secrets never live here; they are read from the environment by
//! [`crate::io::secrets`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "upgrader.toml";

/// Upgrader configuration (TOML).
///
/// Missing fields default to values that work against public Maven Central,
/// OpenAI and GitHub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpgraderConfig {
    /// Repair attempt budget (Troubleshoot iterations).
    pub max_attempts: u32,

    /// Upper bound for one build verification, in seconds.
    pub verify_timeout_secs: u64,

    /// Upper bound for one transform-engine run, in seconds.
    pub transform_timeout_secs: u64,

    /// Upper bound for one git command, in seconds.
    pub vcs_timeout_secs: u64,

    /// Diagnostic text kept per verification, in bytes.
    pub diagnostic_limit_bytes: usize,

    /// Keep the scratch workspace after the run.
    pub keep_workspace: bool,

    /// Write run artifacts (state, plan, diagnostics, report) here.
    pub artifacts_dir: Option<PathBuf>,

    pub advisor: AdvisorConfig,
    pub build: BuildConfig,
    pub transform: TransformConfig,
    pub hosting: HostingConfig,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    /// OpenAI-compatible API base (`.../v1`).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Extra tries after an HTTP 429.
    pub max_retries: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Full verification command for Maven; `mvn` is swapped for `./mvnw`
    /// when the wrapper exists.
    pub maven_command: Vec<String>,
    /// Full verification command for Gradle; `gradle` is swapped for
    /// `./gradlew` when the wrapper exists.
    pub gradle_command: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            maven_command: strings(&["mvn", "-B", "clean", "verify"]),
            gradle_command: strings(&["gradle", "clean", "build"]),
        }
    }
}

/// How the transform engine is invoked.
///
/// Command templates may use `{config}`, `{recipe}`, `{artifacts}` and
/// `{init_script}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransformConfig {
    pub maven_command: Vec<String>,
    pub gradle_command: Vec<String>,
    /// Recipe modules to put on the engine classpath (`group:artifact:version`).
    pub recipe_artifacts: Vec<String>,
    /// Version of the Gradle rewrite plugin used by the generated init script.
    pub gradle_plugin_version: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            maven_command: strings(&[
                "mvn",
                "-B",
                "-U",
                "org.openrewrite.maven:rewrite-maven-plugin:run",
                "-Drewrite.configLocation={config}",
                "-Drewrite.activeRecipes={recipe}",
                "-Drewrite.recipeArtifactCoordinates={artifacts}",
                "-Drewrite.exportDatatables=false",
            ]),
            gradle_command: strings(&[
                "gradle",
                "--init-script",
                "{init_script}",
                "rewriteRun",
            ]),
            recipe_artifacts: strings(&[
                "org.openrewrite.recipe:rewrite-migrate-java:RELEASE",
                "org.openrewrite.recipe:rewrite-spring:RELEASE",
            ]),
            gradle_plugin_version: "latest.release".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostingConfig {
    /// GitHub REST API base.
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub remote: String,
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            author_name: "upgrader-bot".to_string(),
            author_email: "upgrader-bot@users.noreply.github.com".to_string(),
        }
    }
}

impl Default for UpgraderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            verify_timeout_secs: 30 * 60,
            transform_timeout_secs: 30 * 60,
            vcs_timeout_secs: 5 * 60,
            diagnostic_limit_bytes: 16_000,
            keep_workspace: false,
            artifacts_dir: None,
            advisor: AdvisorConfig::default(),
            build: BuildConfig::default(),
            transform: TransformConfig::default(),
            hosting: HostingConfig::default(),
            git: GitConfig::default(),
        }
    }
}

impl UpgraderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be >= 1"));
        }
        for (name, secs) in [
            ("verify_timeout_secs", self.verify_timeout_secs),
            ("transform_timeout_secs", self.transform_timeout_secs),
            ("vcs_timeout_secs", self.vcs_timeout_secs),
            ("advisor.timeout_secs", self.advisor.timeout_secs),
            ("hosting.timeout_secs", self.hosting.timeout_secs),
        ] {
            if secs == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if self.diagnostic_limit_bytes < 256 {
            return Err(anyhow!("diagnostic_limit_bytes must be >= 256"));
        }
        for (name, command) in [
            ("build.maven_command", &self.build.maven_command),
            ("build.gradle_command", &self.build.gradle_command),
            ("transform.maven_command", &self.transform.maven_command),
            ("transform.gradle_command", &self.transform.gradle_command),
        ] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("{name} must be a non-empty array"));
            }
        }
        if self.advisor.model.trim().is_empty() {
            return Err(anyhow!("advisor.model must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.advisor.temperature) {
            return Err(anyhow!("advisor.temperature must be within 0.0..=2.0"));
        }
        Url::parse(&self.advisor.base_url)
            .with_context(|| format!("advisor.base_url '{}'", self.advisor.base_url))?;
        Url::parse(&self.hosting.api_base)
            .with_context(|| format!("hosting.api_base '{}'", self.hosting.api_base))?;
        if self.git.remote.trim().is_empty() {
            return Err(anyhow!("git.remote must be non-empty"));
        }
        Ok(())
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn transform_timeout(&self) -> Duration {
        Duration::from_secs(self.transform_timeout_secs)
    }

    pub fn vcs_timeout(&self) -> Duration {
        Duration::from_secs(self.vcs_timeout_secs)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `UpgraderConfig::default()`.
pub fn load_config(path: &Path) -> Result<UpgraderConfig> {
    if !path.exists() {
        let cfg = UpgraderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: UpgraderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &UpgraderConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, UpgraderConfig::default());
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.advisor.model, "gpt-4");
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("upgrader.toml");
        let mut cfg = UpgraderConfig::default();
        cfg.artifacts_dir = Some(PathBuf::from("/tmp/upgrader-artifacts"));
        cfg.git.author_name = "release-bot".to_string();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("upgrader.toml");
        fs::write(
            &path,
            "max_attempts = 2\n[advisor]\nmodel = \"gpt-4o\"\n[build]\ngradle_command = [\"gradle\", \"check\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.advisor.model, "gpt-4o");
        assert_eq!(cfg.advisor.base_url, AdvisorConfig::default().base_url);
        assert_eq!(cfg.build.gradle_command, vec!["gradle", "check"]);
        assert_eq!(cfg.build.maven_command, BuildConfig::default().maven_command);
    }

    #[test]
    fn rejects_zero_attempts_and_empty_commands() {
        let cfg = UpgraderConfig {
            max_attempts: 0,
            ..UpgraderConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = UpgraderConfig::default();
        cfg.transform.gradle_command = Vec::new();
        let err = cfg.validate().expect_err("empty command");
        assert!(err.to_string().contains("transform.gradle_command"));
    }

    #[test]
    fn rejects_bad_urls() {
        let mut cfg = UpgraderConfig::default();
        cfg.hosting.api_base = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }
}
