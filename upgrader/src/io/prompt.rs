//! Prompt rendering for the advisory model.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::{BuildSystem, ProjectVersions, Transform};

const PLAN_UPGRADE_TEMPLATE: &str = include_str!("prompts/plan_upgrade.md");
const SYNTHESIZE_FIX_TEMPLATE: &str = include_str!("prompts/synthesize_fix.md");

pub const SYSTEM_PROMPT: &str = "You are an expert in Java, Spring Boot and OpenRewrite migrations. \
You answer with a single JSON object that follows the requested shape.";

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("plan_upgrade", PLAN_UPGRADE_TEMPLATE)
            .expect("plan_upgrade template should be valid");
        env.add_template("synthesize_fix", SYNTHESIZE_FIX_TEMPLATE)
            .expect("synthesize_fix template should be valid");
        Self { env }
    }

    pub fn render_plan_upgrade(
        &self,
        build_system: BuildSystem,
        versions: &ProjectVersions,
        target_version: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("plan_upgrade")?;
        template
            .render(context! {
                build_system => build_system.as_str(),
                java_version => versions.java_or_unknown(),
                spring_boot_version => versions.spring_boot_or_unknown(),
                target_version => target_version.unwrap_or("latest stable"),
            })
            .context("render plan_upgrade prompt")
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render_synthesize_fix(
        &self,
        build_system: BuildSystem,
        versions: &ProjectVersions,
        target_version: Option<&str>,
        plan: &[Transform],
        diagnostic_text: &str,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<String> {
        let template = self.env.get_template("synthesize_fix")?;
        let plan: Vec<String> = plan.iter().map(ToString::to_string).collect();
        template
            .render(context! {
                build_system => build_system.as_str(),
                java_version => versions.java_or_unknown(),
                spring_boot_version => versions.spring_boot_or_unknown(),
                target_version => target_version.unwrap_or("latest stable"),
                plan => plan,
                diagnostic_text => diagnostic_text.trim(),
                attempt => attempt,
                max_attempts => max_attempts,
            })
            .context("render synthesize_fix prompt")
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_prompt_mentions_gradle_wrapper_only_for_gradle() {
        let engine = PromptEngine::new();
        let versions = ProjectVersions {
            java: Some("11".to_string()),
            spring_boot: None,
        };
        let gradle = engine
            .render_plan_upgrade(BuildSystem::Gradle, &versions, None)
            .expect("render");
        assert!(gradle.contains("Current Java version: 11"));
        assert!(gradle.contains("Current Spring Boot version: unknown"));
        assert!(gradle.contains("Target version: latest stable"));
        assert!(gradle.contains("UpdateGradleWrapper` first"));

        let maven = engine
            .render_plan_upgrade(BuildSystem::Maven, &versions, Some("3.2"))
            .expect("render");
        assert!(!maven.contains("UpdateGradleWrapper` first"));
        assert!(maven.contains("Target version: 3.2"));
    }

    #[test]
    fn fix_prompt_lists_plan_and_diagnostics() {
        let engine = PromptEngine::new();
        let plan = vec![
            Transform::named("org.openrewrite.java.migrate.UpgradeToJava17"),
            Transform::named("org.openrewrite.gradle.UpdateGradleWrapper")
                .with_parameter("version", "8.x"),
        ];
        let prompt = engine
            .render_synthesize_fix(
                BuildSystem::Maven,
                &ProjectVersions::default(),
                Some("3.2"),
                &plan,
                "[ERROR] package javax.persistence does not exist\n",
                2,
                5,
            )
            .expect("render");
        assert!(prompt.contains("- org.openrewrite.java.migrate.UpgradeToJava17\n"));
        assert!(prompt.contains("- org.openrewrite.gradle.UpdateGradleWrapper(version=8.x)"));
        assert!(prompt.contains("package javax.persistence does not exist"));
        assert!(prompt.contains("Repair attempt: 2 of 5"));
    }

    #[test]
    fn fix_prompt_with_empty_plan() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_synthesize_fix(
                BuildSystem::Gradle,
                &ProjectVersions::default(),
                None,
                &[],
                "boom",
                1,
                1,
            )
            .expect("render");
        assert!(prompt.contains("- (none)"));
    }
}
