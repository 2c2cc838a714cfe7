//! Working-branch naming.

use chrono::{DateTime, Utc};

const BRANCH_PREFIX: &str = "upgrade-java-springboot";

/// Default working branch for a run, e.g.
/// `upgrade-java-springboot-3.2-main-20260101T120000Z-0a1f`.
///
/// The timestamp and suffix are supplied by the caller so the name is
/// reproducible in tests.
pub fn derive_branch_name(
    target_version: Option<&str>,
    base_branch: &str,
    now: DateTime<Utc>,
    suffix: u16,
) -> String {
    let target = target_version
        .map(sanitize_component)
        .filter(|target| !target.is_empty())
        .unwrap_or_else(|| "latest".to_string());
    let base = sanitize_component(base_branch);
    let base = if base.is_empty() { "base".to_string() } else { base };
    format!(
        "{BRANCH_PREFIX}-{target}-{base}-{}-{suffix:04x}",
        now.format("%Y%m%dT%H%M%SZ")
    )
}

fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        } else if ch == '.' {
            if !(out.is_empty() || out.ends_with('.') || out.ends_with('-')) {
                out.push('.');
            }
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches(|c| c == '-' || c == '.').to_string()
}

/// Validate a user-supplied branch name against git's ref-name rules.
pub fn validate_branch_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("branch name is empty".to_string());
    }
    if name == "@" {
        return Err("branch name cannot be '@'".to_string());
    }
    if name.starts_with('-') {
        return Err(format!("branch name '{name}' cannot start with '-'"));
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(format!("branch name '{name}' has an empty path component"));
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return Err(format!("branch name '{name}' has a forbidden suffix"));
    }
    if name.contains("..") || name.contains("@{") {
        return Err(format!("branch name '{name}' contains a forbidden sequence"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| c.is_ascii_control() || c.is_whitespace() || "~^:?*[\\".contains(*c))
    {
        return Err(format!("branch name '{name}' contains forbidden character {bad:?}"));
    }
    if name.split('/').any(|component| component.starts_with('.')) {
        return Err(format!("branch name '{name}' has a component starting with '.'"));
    }
    Ok(())
}
