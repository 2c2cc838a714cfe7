//! Analysis: build system, current versions and the initial transform plan.

use tracing::{info, instrument, warn};

use crate::core::plan::{fallback_plan, validate_transform};
use crate::core::state::RunState;
use crate::core::types::{BuildDescriptor, BuildSystem, Transform};
use crate::io::advisor::{Advisor, PlanRequest};
use crate::io::build::BuildTool;
use crate::nodes::{FatalError, NodeResult, RunSettings};

/// Exactly one build system must be present among the root descriptors.
pub fn resolve_build_system(descriptors: &[BuildDescriptor]) -> Result<BuildSystem, String> {
    let mut systems: Vec<BuildSystem> = descriptors
        .iter()
        .map(|d| d.build_system)
        .filter(|system| *system != BuildSystem::Unknown)
        .collect();
    systems.sort_by_key(|system| system.as_str());
    systems.dedup();
    match systems.as_slice() {
        [single] => Ok(*single),
        [] => Err("no Maven or Gradle build descriptor at the repository root".to_string()),
        _ => {
            let files: Vec<&str> = descriptors.iter().map(|d| d.file.as_str()).collect();
            Err(format!(
                "both Maven and Gradle build descriptors present ({})",
                files.join(", ")
            ))
        }
    }
}

#[instrument(skip_all)]
pub fn run<B: BuildTool, A: Advisor>(
    mut state: RunState,
    build: &B,
    advisor: &A,
    settings: &RunSettings,
) -> NodeResult {
    let workdir = state.workdir().to_path_buf();
    let descriptors = match build.detect(&workdir) {
        Ok(descriptors) => descriptors,
        Err(err) => {
            let reason = settings.describe(&err);
            return NodeResult::Fatal(state, FatalError::BuildSystem(reason));
        }
    };
    let build_system = match resolve_build_system(&descriptors) {
        Ok(system) => system,
        Err(reason) => return NodeResult::Fatal(state, FatalError::BuildSystem(reason)),
    };

    let versions = match build.read_versions(&workdir, build_system) {
        Ok(versions) => versions,
        Err(err) => {
            warn!(err = %settings.describe(&err), "could not read version markers");
            state.add_note("current versions could not be read from the build descriptor");
            Default::default()
        }
    };
    info!(
        %build_system,
        java = versions.java_or_unknown(),
        spring_boot = versions.spring_boot_or_unknown(),
        "project analysed"
    );

    let request = PlanRequest {
        build_system,
        versions: &versions,
        target_version: state.target_version(),
    };
    let (transforms, inferred_target, rationale) = match advisor.plan_upgrade(&request) {
        Ok(plan) => {
            let usable = usable_transforms(plan.transforms);
            if usable.is_empty() {
                warn!("advisory plan had no usable transforms, using fallback plan");
                state.add_note("advisory plan contained no usable transforms; fallback plan used");
                (None, plan.target_version, plan.rationale)
            } else {
                (Some(usable), plan.target_version, plan.rationale)
            }
        }
        Err(err) => {
            warn!(err = %settings.describe(&err), "advisory model unavailable, using fallback plan");
            state.add_note("advisory model unavailable during analysis; fallback plan used");
            (None, None, None)
        }
    };

    state.complete_analysis(build_system, versions, inferred_target);
    let transforms =
        transforms.unwrap_or_else(|| fallback_plan(build_system, state.target_version()));
    for transform in transforms {
        state.append_transform(transform);
    }
    if let Some(rationale) = rationale {
        state.set_rationale(settings.redactor.redact(&rationale));
    }

    if let Some(artifacts) = &settings.artifacts {
        if let Err(err) = artifacts.write_plan(state.transform_plan()) {
            warn!(err = %format!("{err:#}"), "failed to write plan artifact");
        }
    }
    info!(transforms = state.transform_plan().len(), "transform plan seeded");
    NodeResult::Advance(state)
}

/// Drop malformed advisor entries, keeping the order of the rest.
fn usable_transforms(transforms: Vec<Transform>) -> Vec<Transform> {
    transforms
        .into_iter()
        .filter(|transform| match validate_transform(transform) {
            Ok(()) => true,
            Err(reason) => {
                warn!(name = %transform.name, %reason, "dropping malformed plan entry");
                false
            }
        })
        .collect()
}
