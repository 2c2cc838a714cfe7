//! Shared deterministic types for the upgrade workflow.
//!
//! These types define stable contracts between nodes and collaborators. They
//! carry no I/O and serialize to stable JSON for run artifacts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Build system detected from the repository root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    Maven,
    Gradle,
    #[default]
    Unknown,
}

impl BuildSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildSystem::Maven => "maven",
            BuildSystem::Gradle => "gradle",
            BuildSystem::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build descriptor file found at the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub build_system: BuildSystem,
    /// File name relative to the repository root.
    pub file: String,
}

/// Version markers read from the build descriptor.
///
/// `None` means the marker was not found; it is rendered as `unknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectVersions {
    pub java: Option<String>,
    pub spring_boot: Option<String>,
}

impl ProjectVersions {
    pub fn java_or_unknown(&self) -> &str {
        self.java.as_deref().unwrap_or("unknown")
    }

    pub fn spring_boot_or_unknown(&self) -> &str {
        self.spring_boot.as_deref().unwrap_or("unknown")
    }
}

/// A single named code transformation (an OpenRewrite recipe reference).
///
/// `definition` carries an inline declarative recipe when the advisory model
/// authored a new recipe rather than referencing a published one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl Transform {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            definition: None,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self
                .parameters
                .iter()
                .map(|(key, value)| match value {
                    serde_json::Value::String(s) => format!("{key}={s}"),
                    other => format!("{key}={other}"),
                })
                .collect();
            write!(f, "({})", params.join(", "))?;
        }
        Ok(())
    }
}

/// Result classification of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Success,
    Failure,
}

/// Outcome of the most recent verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub status: VerificationStatus,
    /// Bounded, redacted tail of the build output. Empty on success.
    pub diagnostic_text: String,
    /// True when the build (or the transform engine) exceeded its time bound.
    #[serde(default)]
    pub timed_out: bool,
}

impl Verification {
    pub fn success() -> Self {
        Self {
            status: VerificationStatus::Success,
            diagnostic_text: String::new(),
            timed_out: false,
        }
    }

    pub fn failure(diagnostic_text: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Failure,
            diagnostic_text: diagnostic_text.into(),
            timed_out: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VerificationStatus::Success
    }
}

/// Audit entry for a failed verification that Troubleshoot acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub attempt: u32,
    pub diagnostic_text: String,
}

/// Final classification of a run, assigned once inside Finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalOutcome {
    /// PR created and the build is green.
    MergedCandidate,
    /// PR created with a red build after the attempt budget ran out.
    BestEffort,
    /// Unrecoverable failure; no PR (or the PR step itself failed).
    Aborted,
}

impl TerminalOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalOutcome::MergedCandidate => "merged-candidate",
            TerminalOutcome::BestEffort => "best-effort",
            TerminalOutcome::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Setup,
    Analysis,
    ApplyTransforms,
    Verify,
    Troubleshoot,
    Finalize,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Setup => "setup",
            NodeKind::Analysis => "analysis",
            NodeKind::ApplyTransforms => "apply_transforms",
            NodeKind::Verify => "verify",
            NodeKind::Troubleshoot => "troubleshoot",
            NodeKind::Finalize => "finalize",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
