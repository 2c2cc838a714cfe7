//! Code-hosting collaborator: opens the pull request for the working branch.

use anyhow::{Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::io::config::HostingConfig;
use crate::io::http::{build_client, sanitize_error_body, send_with_retry};
use crate::io::secrets::Secret;

const API_VERSION: &str = "2022-11-28";

/// Pull request to open against the repository the run cloned.
#[derive(Debug, Clone)]
pub struct PullRequest<'a> {
    pub repository_url: &'a str,
    pub base_branch: &'a str,
    pub head_branch: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

pub trait CodeHost {
    /// Returns the web URL of the created pull request.
    fn open_pull_request(&self, request: &PullRequest<'_>) -> Result<String>;
}

/// Owner and repository name on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

/// Parse `owner/repo` from an HTTPS, `ssh://`, or scp-style remote URL.
///
/// Supports:
/// - git@github.com:owner/repo.git
/// - ssh://git@github.example.com/owner/repo.git
/// - https://github.com/owner/repo(.git)
pub fn parse_remote_url(url: &str) -> Option<RepoCoordinates> {
    let url = url.trim();
    let path = if url.contains("://") {
        let parsed = url::Url::parse(url).ok()?;
        parsed.host_str()?;
        parsed.path().to_string()
    } else {
        // scp-like syntax: [user@]host:owner/repo.git
        let (host, path) = url.split_once(':')?;
        if host.is_empty() || host.contains('/') {
            return None;
        }
        path.to_string()
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, name) = path.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(RepoCoordinates {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

#[derive(Serialize)]
struct CreatePrRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Deserialize)]
struct CreatePrResponse {
    html_url: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Describe a failed API call without echoing anything credential-shaped.
fn api_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        let detail = parsed
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();
        let message = if detail.is_empty() {
            parsed.message
        } else {
            format!("{}: {}", parsed.message, detail)
        };
        return anyhow!("GitHub API error ({status}): {}", sanitize_error_body(&message));
    }
    anyhow!("GitHub API error ({status}): {}", sanitize_error_body(body))
}

/// [`CodeHost`] for the GitHub REST API (github.com or Enterprise via
/// `api_base`).
pub struct GitHubHost {
    client: Client,
    api_base: String,
    token: Secret,
}

impl GitHubHost {
    pub fn new(config: &HostingConfig, token: Secret) -> Result<Self> {
        Ok(Self {
            client: build_client(std::time::Duration::from_secs(config.timeout_secs))?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }
}

impl CodeHost for GitHubHost {
    #[instrument(skip_all, fields(head = request.head_branch, base = request.base_branch))]
    fn open_pull_request(&self, request: &PullRequest<'_>) -> Result<String> {
        let repo = parse_remote_url(request.repository_url)
            .ok_or_else(|| anyhow!("cannot determine owner/repo from repository URL"))?;
        let endpoint = format!("{}/repos/{}/{}/pulls", self.api_base, repo.owner, repo.name);
        let payload = CreatePrRequest {
            title: request.title,
            body: request.body,
            head: request.head_branch,
            base: request.base_branch,
        };

        // Not retried: a replayed POST could open a second pull request.
        let reply = send_with_retry(
            || {
                self.client
                    .post(&endpoint)
                    .header("Accept", "application/vnd.github+json")
                    .header("X-GitHub-Api-Version", API_VERSION)
                    .bearer_auth(self.token.expose())
                    .json(&payload)
            },
            0,
        )?;
        if !reply.status.is_success() {
            return Err(api_error(reply.status, &reply.body));
        }
        let created: CreatePrResponse = serde_json::from_str(&reply.body)
            .map_err(|err| anyhow!("parse pull request response: {err}"))?;
        if created.html_url.trim().is_empty() {
            bail!("pull request response carried no URL");
        }
        info!(url = %created.html_url, "pull request opened");
        Ok(created.html_url)
    }
}
