//! Transform-engine collaborator backed by OpenRewrite.
//!
//! The whole plan is materialized as one composite declarative recipe in a
//! `rewrite.yml` kept outside the working tree, then run through the build
//! tool's rewrite plugin. Re-running the same plan is expected to be a no-op
//! on an already transformed tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_yaml::{Mapping, Value};
use tracing::{info, instrument, warn};

use crate::core::plan::validate_transform;
use crate::core::types::{BuildSystem, Transform};
use crate::io::build::launcher_command;
use crate::io::config::TransformConfig;
use crate::io::process::run_command_with_timeout;

/// Name of the composite recipe that wraps the plan.
pub const COMPOSITE_RECIPE: &str = "upgrader.UpgradePlan";
const RECIPE_SPEC_TYPE: &str = "specs.openrewrite.org/v1beta/recipe";

/// What the engine reported for one run of the full plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Plan entries the engine reported as having made changes, plan order.
    pub applied: Vec<String>,
    pub timed_out: bool,
    /// Tail of the engine output.
    pub output: String,
}

/// Applies a transform plan to a working tree.
pub trait TransformEngine {
    /// Apply the complete `plan`, in order.
    ///
    /// Malformed entries and engine crashes are `Err`. Entries that change
    /// nothing are not errors.
    fn apply(
        &self,
        workdir: &Path,
        build_system: BuildSystem,
        plan: &[Transform],
        timeout: Duration,
    ) -> Result<ApplyReport>;
}

/// [`TransformEngine`] that runs the OpenRewrite Maven or Gradle plugin.
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    config: TransformConfig,
    engine_dir: PathBuf,
    output_limit_bytes: usize,
}

impl RewriteEngine {
    /// `engine_dir` receives the generated recipe and init script; it must be
    /// outside the working tree so they are never committed.
    pub fn new(config: &TransformConfig, engine_dir: impl Into<PathBuf>, output_limit_bytes: usize) -> Self {
        Self {
            config: config.clone(),
            engine_dir: engine_dir.into(),
            output_limit_bytes,
        }
    }

    fn write_engine_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.engine_dir)
            .with_context(|| format!("create engine dir {}", self.engine_dir.display()))?;
        let path = self.engine_dir.join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn argv(&self, build_system: BuildSystem, config_path: &Path) -> Result<Vec<String>> {
        let template = match build_system {
            BuildSystem::Maven => &self.config.maven_command,
            BuildSystem::Gradle => &self.config.gradle_command,
            BuildSystem::Unknown => {
                return Err(anyhow!("cannot run transforms for unknown build system"));
            }
        };
        let needs_init = template.iter().any(|arg| arg.contains("{init_script}"));
        let init_script = if needs_init {
            let script = gradle_init_script(
                &self.config.gradle_plugin_version,
                &self.config.recipe_artifacts,
                config_path,
            );
            self.write_engine_file("rewrite-init.gradle", &script)?
                .display()
                .to_string()
        } else {
            String::new()
        };
        let config = config_path.display().to_string();
        let artifacts = self.config.recipe_artifacts.join(",");
        Ok(template
            .iter()
            .map(|arg| {
                arg.replace("{config}", &config)
                    .replace("{recipe}", COMPOSITE_RECIPE)
                    .replace("{artifacts}", &artifacts)
                    .replace("{init_script}", &init_script)
            })
            .collect())
    }
}

impl TransformEngine for RewriteEngine {
    #[instrument(skip_all, fields(build_system = %build_system, plan_len = plan.len()))]
    fn apply(
        &self,
        workdir: &Path,
        build_system: BuildSystem,
        plan: &[Transform],
        timeout: Duration,
    ) -> Result<ApplyReport> {
        if plan.is_empty() {
            info!("empty transform plan, nothing to apply");
            return Ok(ApplyReport::default());
        }
        for (idx, transform) in plan.iter().enumerate() {
            validate_transform(transform)
                .map_err(|reason| anyhow!("malformed transform plan entry {}: {reason}", idx + 1))?;
        }

        let recipe = render_recipe(plan)?;
        let config_path = self.write_engine_file("rewrite.yml", &recipe)?;
        let argv = self.argv(build_system, &config_path)?;
        let cmd = launcher_command(&argv, workdir)?;
        info!(program = %argv[0], "running transform engine");
        let output = run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
            .with_context(|| format!("run transform engine '{}'", argv[0]))?;
        let text = output.merged_lossy();

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "transform engine timed out");
            return Ok(ApplyReport {
                applied: Vec::new(),
                timed_out: true,
                output: text,
            });
        }
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            return Err(anyhow!(
                "transform engine exited with {code}:\n{}",
                text.trim_end()
            ));
        }

        let mut applied: Vec<String> = Vec::new();
        for transform in plan {
            if text.contains(&transform.name) && !applied.contains(&transform.name) {
                applied.push(transform.name.clone());
            }
        }
        info!(applied = applied.len(), "transform engine finished");
        Ok(ApplyReport {
            applied,
            timed_out: false,
            output: text,
        })
    }
}

/// Render the plan as declarative recipe YAML: inline definitions first
/// (once per name), then the composite recipe listing every plan entry in
/// order, duplicates included.
pub fn render_recipe(plan: &[Transform]) -> Result<String> {
    let mut documents: Vec<String> = Vec::new();
    let mut defined: Vec<&str> = Vec::new();
    for transform in plan {
        if let Some(definition) = &transform.definition {
            if defined.contains(&transform.name.as_str()) {
                continue;
            }
            defined.push(&transform.name);
            let trimmed = definition.trim().trim_start_matches("---").trim_start();
            documents.push(format!("{trimmed}\n"));
        }
    }

    let mut recipe_list = Vec::with_capacity(plan.len());
    for transform in plan {
        if transform.parameters.is_empty() {
            recipe_list.push(Value::String(transform.name.clone()));
            continue;
        }
        let params = serde_yaml::to_value(&transform.parameters)
            .with_context(|| format!("serialize parameters of {}", transform.name))?;
        let mut entry = Mapping::new();
        entry.insert(Value::String(transform.name.clone()), params);
        recipe_list.push(Value::Mapping(entry));
    }

    let mut composite = Mapping::new();
    composite.insert("type".into(), RECIPE_SPEC_TYPE.into());
    composite.insert("name".into(), COMPOSITE_RECIPE.into());
    composite.insert("displayName".into(), "Automated upgrade plan".into());
    composite.insert(
        "description".into(),
        "Transforms selected for this upgrade run, in application order.".into(),
    );
    composite.insert("recipeList".into(), Value::Sequence(recipe_list));
    documents.push(serde_yaml::to_string(&Value::Mapping(composite)).context("serialize composite recipe")?);

    Ok(documents.join("---\n"))
}

fn gradle_init_script(plugin_version: &str, artifacts: &[String], config_path: &Path) -> String {
    let mut deps = String::new();
    for artifact in artifacts {
        deps.push_str(&format!("        rewrite(\"{artifact}\")\n"));
    }
    let config = config_path.display().to_string().replace('\\', "/");
    format!(
        r#"initscript {{
    repositories {{
        maven {{ url "https://plugins.gradle.org/m2" }}
    }}
    dependencies {{
        classpath("org.openrewrite:plugin:{plugin_version}")
    }}
}}

rootProject {{
    plugins.apply(org.openrewrite.gradle.RewritePlugin)
    dependencies {{
{deps}    }}
    rewrite {{
        activeRecipe("{COMPOSITE_RECIPE}")
        configFile = file("{config}")
    }}
    afterEvaluate {{
        if (repositories.isEmpty()) {{
            repositories {{
                mavenCentral()
            }}
        }}
    }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Vec<Transform> {
        vec![
            Transform::named("org.openrewrite.java.migrate.UpgradeToJava17"),
            Transform::named("org.openrewrite.gradle.UpdateGradleWrapper")
                .with_parameter("version", "8.x"),
            Transform::named("org.openrewrite.java.migrate.UpgradeToJava17"),
        ]
    }

    #[test]
    fn composite_recipe_keeps_order_and_duplicates() {
        let yaml = render_recipe(&plan()).expect("render");
        let doc: Value = serde_yaml::from_str(&yaml).expect("parse");
        assert_eq!(doc["name"], Value::from(COMPOSITE_RECIPE));
        let list = doc["recipeList"].as_sequence().expect("list");
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], Value::from("org.openrewrite.java.migrate.UpgradeToJava17"));
        assert_eq!(
            list[1]["org.openrewrite.gradle.UpdateGradleWrapper"]["version"],
            Value::from("8.x")
        );
        assert_eq!(list[2], list[0]);
    }

    #[test]
    fn inline_definitions_are_emitted_once_before_composite() {
        let definition = "type: specs.openrewrite.org/v1beta/recipe\nname: custom.JakartaFix\nrecipeList:\n  - org.openrewrite.java.ChangePackage:\n      oldPackageName: javax.persistence\n      newPackageName: jakarta.persistence\n";
        let fix = Transform {
            definition: Some(definition.to_string()),
            ..Transform::named("custom.JakartaFix")
        };
        let yaml = render_recipe(&[fix.clone(), fix]).expect("render");
        let docs: Vec<&str> = yaml.split("---\n").collect();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains("name: custom.JakartaFix"));
        assert!(docs[1].contains(COMPOSITE_RECIPE));
    }

    #[test]
    fn malformed_entry_is_rejected_before_running() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = RewriteEngine::new(&TransformConfig::default(), temp.path().join("engine"), 4096);
        let err = engine
            .apply(
                temp.path(),
                BuildSystem::Maven,
                &[Transform::named("not a recipe")],
                Duration::from_secs(1),
            )
            .expect_err("malformed");
        assert!(err.to_string().contains("malformed transform plan entry 1"));
        assert!(!temp.path().join("engine").join("rewrite.yml").exists());
    }

    #[test]
    fn gradle_template_gets_init_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = RewriteEngine::new(&TransformConfig::default(), temp.path(), 4096);
        let config_path = temp.path().join("rewrite.yml");
        let argv = engine
            .argv(BuildSystem::Gradle, &config_path)
            .expect("argv");
        let init = temp.path().join("rewrite-init.gradle");
        assert_eq!(argv[2], init.display().to_string());
        let script = fs::read_to_string(init).expect("init script");
        assert!(script.contains("activeRecipe(\"upgrader.UpgradePlan\")"));
        assert!(script.contains("rewrite(\"org.openrewrite.recipe:rewrite-spring:RELEASE\")"));
    }

    #[test]
    fn maven_template_substitutes_placeholders() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = RewriteEngine::new(&TransformConfig::default(), temp.path(), 4096);
        let argv = engine
            .argv(BuildSystem::Maven, Path::new("/tmp/x/rewrite.yml"))
            .expect("argv");
        assert!(argv.contains(&"-Drewrite.configLocation=/tmp/x/rewrite.yml".to_string()));
        assert!(argv.contains(&"-Drewrite.activeRecipes=upgrader.UpgradePlan".to_string()));
        assert!(argv.iter().all(|arg| !arg.contains('{')));
    }

    #[cfg(unix)]
    #[test]
    fn reports_applied_entries_from_engine_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = TransformConfig {
            maven_command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "test -f \"$0\" && echo 'Changes have been made to pom.xml by: org.openrewrite.java.migrate.UpgradeToJava17'"
                    .to_string(),
                "{config}".to_string(),
            ],
            ..TransformConfig::default()
        };
        let engine = RewriteEngine::new(&config, temp.path().join("engine"), 4096);
        let report = engine
            .apply(temp.path(), BuildSystem::Maven, &plan(), Duration::from_secs(10))
            .expect("apply");
        assert!(!report.timed_out);
        assert_eq!(
            report.applied,
            vec!["org.openrewrite.java.migrate.UpgradeToJava17".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn engine_crash_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = TransformConfig {
            maven_command: vec!["sh".to_string(), "-c".to_string(), "echo boom; exit 2".to_string()],
            ..TransformConfig::default()
        };
        let engine = RewriteEngine::new(&config, temp.path().join("engine"), 4096);
        let err = engine
            .apply(temp.path(), BuildSystem::Maven, &plan(), Duration::from_secs(10))
            .expect_err("crash");
        assert!(err.to_string().contains("exited with 2"));
    }
}
