//! Run artifacts written under `artifacts_dir` for post-mortem review.
//!
//! Layout:
//! - `plan.json` transform plan as first produced by Analysis
//! - `attempt-<n>/diagnostic.log` redacted build output that triggered attempt `n`
//! - `run.json` final run state
//! - `report.md` summary report

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::state::RunState;
use crate::core::types::Transform;

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create artifacts dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_plan(&self, plan: &[Transform]) -> Result<PathBuf> {
        let path = self.root.join("plan.json");
        write_json(&path, &plan)?;
        Ok(path)
    }

    pub fn write_attempt_diagnostic(&self, attempt: u32, diagnostic_text: &str) -> Result<PathBuf> {
        let dir = self.root.join(format!("attempt-{attempt}"));
        fs::create_dir_all(&dir)
            .with_context(|| format!("create attempt dir {}", dir.display()))?;
        let path = dir.join("diagnostic.log");
        write_text(&path, diagnostic_text)?;
        Ok(path)
    }

    pub fn write_run(&self, state: &RunState) -> Result<PathBuf> {
        let path = self.root.join("run.json");
        write_json(&path, state)?;
        Ok(path)
    }

    pub fn write_report(&self, report: &str) -> Result<PathBuf> {
        let path = self.root.join("report.md");
        write_text(&path, report)?;
        Ok(path)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    debug!(path = %path.display(), bytes = contents.len(), "writing artifact");
    let mut buf = contents.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("write artifact {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize artifact {}", path.display()))?;
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_state;

    #[test]
    fn writes_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let writer = ArtifactWriter::new(temp.path().join("out")).expect("writer");

        writer
            .write_plan(&[Transform::named("org.openrewrite.java.migrate.UpgradeToJava17")])
            .expect("plan");
        writer
            .write_attempt_diagnostic(2, "[ERROR] boom")
            .expect("diagnostic");
        writer.write_run(&seeded_state(3)).expect("run");
        writer.write_report("Outcome: aborted").expect("report");

        let root = writer.root();
        let plan = fs::read_to_string(root.join("plan.json")).expect("read plan");
        assert!(plan.contains("UpgradeToJava17"));
        assert_eq!(
            fs::read_to_string(root.join("attempt-2/diagnostic.log")).expect("read log"),
            "[ERROR] boom\n"
        );
        let run: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(root.join("run.json")).expect("read run"))
                .expect("json");
        assert_eq!(run["max_attempts"], 3);
        assert!(root.join("report.md").exists());
    }
}
