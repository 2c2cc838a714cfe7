//! Advisory-model collaborator: upgrade planning and fix synthesis through an
//! OpenAI-compatible chat completions API.
//!
//! Replies are requested as JSON and checked against bundled JSON Schemas.
//! Free-text replies are still mined for `org.openrewrite.*` identifiers.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::{Draft, Validator};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::plan::extract_recipe_ids;
use crate::core::types::{BuildSystem, ProjectVersions, Transform};
use crate::io::config::AdvisorConfig;
use crate::io::http::{build_client, sanitize_error_body, send_with_retry};
use crate::io::prompt::{PromptEngine, SYSTEM_PROMPT};
use crate::io::secrets::Secret;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan_response.schema.json");
const FIX_SCHEMA: &str = include_str!("../../schemas/fix_response.schema.json");
const MAX_RATIONALE_LEN: usize = 4000;

/// Inputs for the one-off upgrade plan.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub build_system: BuildSystem,
    pub versions: &'a ProjectVersions,
    pub target_version: Option<&'a str>,
}

/// Ordered transforms proposed by the advisory model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradePlan {
    pub transforms: Vec<Transform>,
    /// Target the model chose when none was supplied.
    pub target_version: Option<String>,
    pub rationale: Option<String>,
}

/// Inputs for one repair attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest<'a> {
    pub diagnostic_text: &'a str,
    pub build_system: BuildSystem,
    pub versions: &'a ProjectVersions,
    pub target_version: Option<&'a str>,
    pub plan: &'a [Transform],
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Natural-language reasoning used by Analysis and Troubleshoot.
///
/// Both calls are best-effort: the workflow degrades on `Err`.
pub trait Advisor {
    fn plan_upgrade(&self, request: &PlanRequest<'_>) -> Result<UpgradePlan>;

    /// Propose one transform addressing the diagnostic, or `None`.
    fn synthesize_fix(&self, request: &FixRequest<'_>) -> Result<Option<Transform>>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransformReply {
    name: String,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
    #[serde(default)]
    definition: Option<String>,
}

impl From<TransformReply> for Transform {
    fn from(reply: TransformReply) -> Self {
        Transform {
            name: reply.name.trim().to_string(),
            parameters: reply.parameters,
            definition: reply.definition.filter(|text| !text.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    transforms: Vec<TransformReply>,
    #[serde(default)]
    target_version: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixReply {
    transform: Option<TransformReply>,
    #[serde(default)]
    explanation: Option<String>,
}

/// [`Advisor`] backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiAdvisor {
    client: Client,
    config: AdvisorConfig,
    api_key: Option<Secret>,
    prompts: PromptEngine,
    plan_schema: Validator,
    fix_schema: Validator,
}

impl OpenAiAdvisor {
    /// Without an API key every call fails and the workflow takes its
    /// degraded path.
    pub fn new(config: &AdvisorConfig, api_key: Option<Secret>) -> Result<Self> {
        let client = build_client(std::time::Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            prompts: PromptEngine::new(),
            plan_schema: compile_schema(PLAN_SCHEMA).context("compile plan reply schema")?,
            fix_schema: compile_schema(FIX_SCHEMA).context("compile fix reply schema")?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// One chat round trip; returns the assistant message content.
    fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("advisory model unavailable: no API key configured"))?;
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let endpoint = self.endpoint();
        let reply = send_with_retry(
            || {
                self.client
                    .post(&endpoint)
                    .bearer_auth(api_key.expose())
                    .json(&request)
            },
            self.config.max_retries,
        )?;
        if !reply.status.is_success() {
            bail!(
                "advisory model returned {}: {}",
                reply.status,
                sanitize_error_body(&reply.body)
            );
        }
        let parsed: ChatResponse =
            serde_json::from_str(&reply.body).context("parse chat completion response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("advisory model returned an empty reply"))?;
        debug!(reply_len = content.len(), "advisory model replied");
        Ok(content)
    }
}

impl Advisor for OpenAiAdvisor {
    #[instrument(skip_all, fields(build_system = %request.build_system, model = %self.config.model))]
    fn plan_upgrade(&self, request: &PlanRequest<'_>) -> Result<UpgradePlan> {
        let prompt = self.prompts.render_plan_upgrade(
            request.build_system,
            request.versions,
            request.target_version,
        )?;
        let content = self.complete(&prompt)?;
        let plan = parse_plan_reply(&content, &self.plan_schema)?;
        info!(transforms = plan.transforms.len(), "advisory model proposed a plan");
        Ok(plan)
    }

    #[instrument(skip_all, fields(attempt = request.attempt, model = %self.config.model))]
    fn synthesize_fix(&self, request: &FixRequest<'_>) -> Result<Option<Transform>> {
        let prompt = self.prompts.render_synthesize_fix(
            request.build_system,
            request.versions,
            request.target_version,
            request.plan,
            request.diagnostic_text,
            request.attempt,
            request.max_attempts,
        )?;
        let content = self.complete(&prompt)?;
        let fix = parse_fix_reply(&content, &self.fix_schema)?;
        match &fix {
            Some(transform) => info!(transform = %transform.name, "advisory model proposed a fix"),
            None => info!("advisory model proposed no fix"),
        }
        Ok(fix)
    }
}

fn compile_schema(raw: &str) -> Result<Validator> {
    let schema: Value = serde_json::from_str(raw).context("parse schema json")?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("compile json schema: {err}"))
}

/// Parse reply content as JSON, tolerating a surrounding Markdown fence.
fn reply_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).ok()
}

fn check_schema(schema: &Validator, instance: &Value) -> Result<()> {
    let messages: Vec<String> = schema
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("reply failed schema validation:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn clip(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_RATIONALE_LEN {
        return text.to_string();
    }
    let mut end = MAX_RATIONALE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

pub(crate) fn parse_plan_reply(content: &str, schema: &Validator) -> Result<UpgradePlan> {
    if let Some(json) = reply_json(content) {
        check_schema(schema, &json)?;
        let reply: PlanReply = serde_json::from_value(json).context("decode plan reply")?;
        return Ok(UpgradePlan {
            transforms: reply.transforms.into_iter().map(Transform::from).collect(),
            target_version: reply
                .target_version
                .map(|target| target.trim().to_string())
                .filter(|target| !target.is_empty()),
            rationale: reply.rationale.map(|text| clip(&text)).filter(|text| !text.is_empty()),
        });
    }
    let ids = extract_recipe_ids(content);
    if ids.is_empty() {
        bail!("advisory model reply named no transforms");
    }
    Ok(UpgradePlan {
        transforms: ids.into_iter().map(Transform::named).collect(),
        target_version: None,
        rationale: Some(clip(content)),
    })
}

pub(crate) fn parse_fix_reply(content: &str, schema: &Validator) -> Result<Option<Transform>> {
    if let Some(json) = reply_json(content) {
        check_schema(schema, &json)?;
        let reply: FixReply = serde_json::from_value(json).context("decode fix reply")?;
        if let Some(explanation) = &reply.explanation {
            debug!(explanation = %clip(explanation), "fix explanation");
        }
        return Ok(reply.transform.map(Transform::from));
    }
    Ok(extract_recipe_ids(content)
        .into_iter()
        .next()
        .map(Transform::named))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_schema() -> Validator {
        compile_schema(PLAN_SCHEMA).expect("plan schema")
    }

    fn fix_schema() -> Validator {
        compile_schema(FIX_SCHEMA).expect("fix schema")
    }

    #[test]
    fn parses_json_plan_with_parameters() {
        let content = r#"{
            "transforms": [
                {"name": "org.openrewrite.gradle.UpdateGradleWrapper", "parameters": {"version": "8.x"}},
                {"name": "org.openrewrite.java.migrate.UpgradeToJava17"}
            ],
            "target_version": "3.2",
            "rationale": "Gradle first, then Java."
        }"#;
        let plan = parse_plan_reply(content, &plan_schema()).expect("parse");
        assert_eq!(plan.transforms.len(), 2);
        assert_eq!(
            plan.transforms[0],
            Transform::named("org.openrewrite.gradle.UpdateGradleWrapper")
                .with_parameter("version", "8.x")
        );
        assert_eq!(plan.target_version.as_deref(), Some("3.2"));
        assert_eq!(plan.rationale.as_deref(), Some("Gradle first, then Java."));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let content = "```json\n{\"transforms\": [{\"name\": \"a.B\"}]}\n```";
        let plan = parse_plan_reply(content, &plan_schema()).expect("parse");
        assert_eq!(plan.transforms, vec![Transform::named("a.B")]);
    }

    #[test]
    fn schema_violation_is_an_error() {
        let content = r#"{"transforms": [{"recipe": "a.B"}]}"#;
        let err = parse_plan_reply(content, &plan_schema()).expect_err("schema");
        assert!(err.to_string().contains("schema validation"));
    }

    #[test]
    fn free_text_plan_falls_back_to_mentions() {
        let content = "Run org.openrewrite.java.migrate.UpgradeToJava17 and then \
                       org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_2.";
        let plan = parse_plan_reply(content, &plan_schema()).expect("parse");
        assert_eq!(plan.transforms.len(), 2);
        assert!(plan.rationale.is_some());
        assert!(parse_plan_reply("no idea", &plan_schema()).is_err());
    }

    #[test]
    fn fix_reply_null_is_none() {
        let fix = parse_fix_reply(r#"{"transform": null, "explanation": "cannot fix"}"#, &fix_schema())
            .expect("parse");
        assert_eq!(fix, None);
    }

    #[test]
    fn fix_reply_with_definition() {
        let content = r#"{"transform": {"name": "upgrader.fix.Jakarta", "definition": "type: specs.openrewrite.org/v1beta/recipe\nname: upgrader.fix.Jakarta\n"}}"#;
        let fix = parse_fix_reply(content, &fix_schema())
            .expect("parse")
            .expect("some fix");
        assert_eq!(fix.name, "upgrader.fix.Jakarta");
        assert!(fix.definition.is_some());
    }

    #[test]
    fn free_text_fix_without_recipe_is_none() {
        let fix = parse_fix_reply("Try cleaning your build.", &fix_schema()).expect("parse");
        assert_eq!(fix, None);
        let fix = parse_fix_reply(
            "Use org.openrewrite.java.migrate.jakarta.JavaxMigrationToJakarta here.",
            &fix_schema(),
        )
        .expect("parse");
        assert_eq!(
            fix.map(|t| t.name),
            Some("org.openrewrite.java.migrate.jakarta.JavaxMigrationToJakarta".to_string())
        );
    }

    #[test]
    fn missing_api_key_fails_fast() {
        let advisor = OpenAiAdvisor::new(&AdvisorConfig::default(), None).expect("advisor");
        let versions = ProjectVersions::default();
        let err = advisor
            .plan_upgrade(&PlanRequest {
                build_system: BuildSystem::Maven,
                versions: &versions,
                target_version: None,
            })
            .expect_err("no key");
        assert!(err.to_string().contains("no API key"));
    }
}
