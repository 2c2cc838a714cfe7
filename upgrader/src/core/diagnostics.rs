//! Bounding and scrubbing of diagnostic text before it enters the run state.

const TRUNCATION_MARKER: &str = "[... earlier output truncated ...]\n";
const REDACTED: &str = "[REDACTED]";
/// Secrets shorter than this are not scrubbed; they would match ordinary text.
const MIN_SECRET_LEN: usize = 8;

/// Keep the last `limit` bytes of `text` (on a char boundary).
///
/// When anything is dropped the result starts with a truncation marker and its
/// total length, marker included, stays within `limit`.
pub fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let budget = limit.saturating_sub(TRUNCATION_MARKER.len());
    let mut start = text.len() - budget;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let mut out = String::with_capacity(limit);
    if limit >= TRUNCATION_MARKER.len() {
        out.push_str(TRUNCATION_MARKER);
    }
    out.push_str(&text[start..]);
    out
}

/// Keep at most the last `max_lines` lines of `text`.
pub fn last_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.trim_end().to_string();
    }
    let mut out = format!("[... {} lines omitted ...]\n", lines.len() - max_lines);
    out.push_str(&lines[lines.len() - max_lines..].join("\n"));
    out
}

/// Replaces known secret values with a fixed marker.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|secret| secret.len() >= MIN_SECRET_LEN)
            .collect();
        // Longest first so a secret that contains another is scrubbed whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }

    /// Redact, then bound to `limit` bytes keeping the tail.
    pub fn scrub(&self, text: &str, limit: usize) -> String {
        tail(&self.redact(text), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_short_text_verbatim() {
        assert_eq!(tail("BUILD FAILURE", 100), "BUILD FAILURE");
    }

    #[test]
    fn tail_keeps_end_within_limit() {
        let text = format!("{}[ERROR] cannot find symbol", "x".repeat(500));
        let out = tail(&text, 80);
        assert!(out.len() <= 80);
        assert!(out.starts_with(TRUNCATION_MARKER));
        assert!(out.ends_with("[ERROR] cannot find symbol"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "é".repeat(100);
        let out = tail(&text, 51);
        assert!(out.len() <= 51);
        assert!(out.ends_with('é'));
    }

    #[test]
    fn last_lines_reports_omitted_count() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(last_lines(text, 2), "[... 2 lines omitted ...]\nc\nd");
        assert_eq!(last_lines(text, 10), "a\nb\nc\nd");
    }

    #[test]
    fn redactor_scrubs_secrets_and_ignores_short_values() {
        let redactor = Redactor::new(["ghp_abcdefghijklmnop", "abc", ""]);
        let out = redactor.redact("push failed: https://ghp_abcdefghijklmnop@github.com abc");
        assert_eq!(out, "push failed: https://[REDACTED]@github.com abc");
    }

    #[test]
    fn scrub_redacts_before_truncating() {
        let secret = "sk-0123456789abcdef";
        let redactor = Redactor::new([secret]);
        let text = format!("{}{}", "y".repeat(200), secret);
        let out = redactor.scrub(&text, 60);
        assert!(!out.contains("sk-0123"));
        assert!(out.ends_with(REDACTED));
    }
}
