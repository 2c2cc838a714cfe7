//! Transform plan helpers: identifier validation, fallback plans and recipe
//! extraction from free-form advisor text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;

use crate::core::types::{BuildSystem, Transform};

const RECIPE_SPEC_TYPE: &str = "specs.openrewrite.org/v1beta/recipe";

static TRANSFORM_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)+$")
        .expect("transform name regex should compile")
});

static RECIPE_MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"org\.openrewrite\.[A-Za-z0-9_.]+").expect("recipe mention regex should compile")
});

/// True for dotted Java-style identifiers such as `org.openrewrite.java.migrate.UpgradeToJava17`.
pub fn is_valid_transform_name(name: &str) -> bool {
    TRANSFORM_NAME_RE.is_match(name)
}

/// Check a transform is well-formed enough to hand to the transform engine.
///
/// An inline definition must be a declarative recipe document whose name
/// matches the transform name.
pub fn validate_transform(transform: &Transform) -> Result<(), String> {
    if !is_valid_transform_name(&transform.name) {
        return Err(format!("malformed transform name '{}'", transform.name));
    }
    if let Some(definition) = &transform.definition {
        validate_definition(&transform.name, definition)?;
    }
    Ok(())
}

fn validate_definition(name: &str, definition: &str) -> Result<(), String> {
    let mut declares_name = false;
    for document in serde_yaml::Deserializer::from_str(definition) {
        let value = Value::deserialize(document)
            .map_err(|err| format!("definition for '{name}' is not valid YAML: {err}"))?;
        let Value::Mapping(map) = value else {
            return Err(format!("definition for '{name}' must be a YAML mapping"));
        };
        let doc_type = map.get("type").and_then(Value::as_str);
        if doc_type != Some(RECIPE_SPEC_TYPE) {
            return Err(format!(
                "definition for '{name}' must declare type {RECIPE_SPEC_TYPE}"
            ));
        }
        if map.get("name").and_then(Value::as_str) == Some(name) {
            declares_name = true;
        }
    }
    if !declares_name {
        return Err(format!("definition does not declare recipe '{name}'"));
    }
    Ok(())
}

/// Minimal plan used when the advisory model cannot produce one.
pub fn fallback_plan(build_system: BuildSystem, target_version: Option<&str>) -> Vec<Transform> {
    let mut plan = Vec::new();
    if build_system == BuildSystem::Gradle {
        plan.push(
            Transform::named("org.openrewrite.gradle.UpdateGradleWrapper")
                .with_parameter("version", "8.x"),
        );
    }
    let java = target_java_release(target_version);
    plan.push(Transform::named(format!(
        "org.openrewrite.java.migrate.UpgradeToJava{java}"
    )));
    let boot_minor = target_spring_boot_minor(target_version);
    plan.push(Transform::named(format!(
        "org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_{boot_minor}"
    )));
    plan
}

/// Java LTS release to migrate to. Only a target whose leading number is a
/// Java release (17 or later) moves this off 17.
fn target_java_release(target_version: Option<&str>) -> u32 {
    let leading = target_version
        .and_then(|target| leading_number(target))
        .unwrap_or(0);
    if leading >= 21 { 21 } else { 17 }
}

/// Spring Boot 3 minor to migrate to; defaults to 2 unless the target looks
/// like `3.<minor>` with a minor that has a published recipe.
fn target_spring_boot_minor(target_version: Option<&str>) -> u32 {
    let Some(target) = target_version else {
        return 2;
    };
    let digits: String = target
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .collect();
    let mut parts = digits.split('.');
    match (parts.next(), parts.next()) {
        (Some("3"), Some(minor)) => match minor.parse::<u32>() {
            Ok(minor) if minor <= 4 => minor,
            _ => 2,
        },
        _ => 2,
    }
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Extract `org.openrewrite.*` recipe identifiers mentioned in free text,
/// first mention first, without repeats.
pub fn extract_recipe_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for found in RECIPE_MENTION_RE.find_iter(text) {
        let id = found.as_str().trim_end_matches('.');
        if is_valid_transform_name(id) && !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_names_must_be_dotted_identifiers() {
        assert!(is_valid_transform_name(
            "org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_2"
        ));
        assert!(is_valid_transform_name("custom.FixJakartaImports"));
        assert!(!is_valid_transform_name("UpgradeToJava17"));
        assert!(!is_valid_transform_name("org.openrewrite..Broken"));
        assert!(!is_valid_transform_name("org.openrewrite.java; rm -rf /"));
        assert!(!is_valid_transform_name(""));
    }

    #[test]
    fn definition_must_declare_matching_recipe() {
        let good = Transform {
            definition: Some(
                "type: specs.openrewrite.org/v1beta/recipe\nname: custom.Fix\nrecipeList:\n  - org.openrewrite.java.ChangeType:\n      oldFullyQualifiedTypeName: javax.A\n      newFullyQualifiedTypeName: jakarta.A\n"
                    .to_string(),
            ),
            ..Transform::named("custom.Fix")
        };
        assert!(validate_transform(&good).is_ok());

        let mismatched = Transform {
            definition: Some(
                "type: specs.openrewrite.org/v1beta/recipe\nname: custom.Other\n".to_string(),
            ),
            ..Transform::named("custom.Fix")
        };
        let err = validate_transform(&mismatched).expect_err("mismatch");
        assert!(err.contains("does not declare"));

        let not_yaml = Transform {
            definition: Some("{{{".to_string()),
            ..Transform::named("custom.Fix")
        };
        assert!(validate_transform(&not_yaml).is_err());
    }

    #[test]
    fn fallback_plan_for_maven_defaults_to_java17_and_boot32() {
        let names: Vec<String> = fallback_plan(BuildSystem::Maven, None)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "org.openrewrite.java.migrate.UpgradeToJava17",
                "org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_2",
            ]
        );
    }

    #[test]
    fn fallback_plan_for_gradle_updates_wrapper_first() {
        let plan = fallback_plan(BuildSystem::Gradle, Some("21"));
        assert_eq!(plan[0].name, "org.openrewrite.gradle.UpdateGradleWrapper");
        assert_eq!(plan[1].name, "org.openrewrite.java.migrate.UpgradeToJava21");
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn fallback_plan_follows_spring_boot_target() {
        let plan = fallback_plan(BuildSystem::Maven, Some("Spring Boot 3.3"));
        assert_eq!(
            plan[1].name,
            "org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_3"
        );
        assert_eq!(plan[0].name, "org.openrewrite.java.migrate.UpgradeToJava17");
    }

    #[test]
    fn extracts_recipe_mentions_in_order_without_repeats() {
        let text = "Apply org.openrewrite.java.migrate.UpgradeToJava17. Then \
                    `org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_2` and again \
                    org.openrewrite.java.migrate.UpgradeToJava17";
        assert_eq!(
            extract_recipe_ids(text),
            vec![
                "org.openrewrite.java.migrate.UpgradeToJava17",
                "org.openrewrite.java.spring.boot3.UpgradeSpringBoot_3_2",
            ]
        );
    }
}
