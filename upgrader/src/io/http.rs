//! Shared blocking HTTP plumbing: client construction, bounded retry on
//! rate limits and transient failures, and error-body sanitizing.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use tracing::warn;

const INITIAL_BACKOFF_MS: u64 = 1000;
const BACKOFF_MULTIPLIER: u64 = 2;
const MAX_RETRY_AFTER_SECS: u64 = 60;
const MAX_ERROR_BODY_LEN: usize = 200;

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("upgrader/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("create HTTP client")
}

pub(crate) fn backoff(retry_count: u32) -> Duration {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    Duration::from_millis(INITIAL_BACKOFF_MS.saturating_mul(factor))
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let secs: u64 = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// Send the request built by `build`, retrying up to `max_retries` times on
/// HTTP 429, 5xx, and connect/timeout errors.
///
/// Any completed response is returned, successful or not; the caller decides
/// what a non-success status means.
pub fn send_with_retry(build: impl Fn() -> RequestBuilder, max_retries: u32) -> Result<HttpReply> {
    let mut retry_count = 0;
    loop {
        let response = match build().send() {
            Ok(response) => response,
            Err(err) => {
                if (err.is_timeout() || err.is_connect()) && retry_count < max_retries {
                    retry_count += 1;
                    warn!(retry_count, err = %err.without_url(), "transient HTTP error, retrying");
                    thread::sleep(backoff(retry_count));
                    continue;
                }
                return Err(anyhow!("HTTP request failed: {}", err.without_url()));
            }
        };

        let status = response.status();
        let wait = retry_after(response.headers());
        let body = response
            .text()
            .map_err(|err| anyhow!("read HTTP response body: {}", err.without_url()))?;

        let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if retryable && retry_count < max_retries {
            retry_count += 1;
            let delay = wait.unwrap_or_else(|| backoff(retry_count));
            warn!(
                retry_count,
                status = status.as_u16(),
                delay_ms = delay.as_millis() as u64,
                "HTTP request throttled or failed upstream, retrying"
            );
            thread::sleep(delay);
            continue;
        }
        return Ok(HttpReply { status, body });
    }
}

/// Shorten an API error body and hide it entirely when it looks like it
/// carries credentials.
pub fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    let body = body.trim();
    let truncated = if body.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(error details redacted: may contain sensitive data)".to_string();
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(1000));
        assert_eq!(backoff(2), Duration::from_millis(2000));
        assert_eq!(backoff(3), Duration::from_millis(4000));
    }

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_error_body(&body);
        assert!(out.ends_with("... (truncated)"));
        assert!(out.len() < 250);
    }

    #[test]
    fn sanitize_hides_credential_looking_bodies() {
        let out = sanitize_error_body(r#"{"message":"Bad credentials","token":"ghp_x"}"#);
        assert!(out.contains("redacted"));
        assert!(!out.contains("ghp_"));
    }

    #[test]
    fn sanitize_keeps_plain_errors() {
        let body = r#"{"message":"Validation Failed","errors":[{"message":"A pull request already exists"}]}"#;
        assert_eq!(sanitize_error_body(body), body);
    }
}
