//! Build-tool collaborator: descriptor detection, version markers and the
//! full verification run for Maven and Gradle projects.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::core::types::{BuildDescriptor, BuildSystem, ProjectVersions, Verification};
use crate::io::config::BuildConfig;
use crate::io::process::run_command_with_timeout;

const MAVEN_DESCRIPTORS: &[&str] = &["pom.xml"];
const GRADLE_DESCRIPTORS: &[&str] = &[
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "settings.gradle.kts",
];

/// Build operations used by the workflow.
pub trait BuildTool {
    /// Canonical build descriptors present at the repository root.
    fn detect(&self, workdir: &Path) -> Result<Vec<BuildDescriptor>>;

    /// Java and Spring Boot version markers from the build descriptor.
    fn read_versions(&self, workdir: &Path, build_system: BuildSystem) -> Result<ProjectVersions>;

    /// Run the full verification target.
    ///
    /// A failing or timed-out build is an `Ok` failure verification; `Err`
    /// means the build tool could not be run at all.
    fn verify(
        &self,
        workdir: &Path,
        build_system: BuildSystem,
        timeout: Duration,
    ) -> Result<Verification>;
}

/// [`BuildTool`] that shells out to `mvn`/`gradle` (or their wrappers).
#[derive(Debug, Clone)]
pub struct CommandBuildTool {
    config: BuildConfig,
    output_limit_bytes: usize,
}

impl CommandBuildTool {
    pub fn new(config: &BuildConfig, output_limit_bytes: usize) -> Self {
        Self {
            config: config.clone(),
            output_limit_bytes,
        }
    }

    fn command_for(&self, build_system: BuildSystem) -> Result<&[String]> {
        match build_system {
            BuildSystem::Maven => Ok(&self.config.maven_command),
            BuildSystem::Gradle => Ok(&self.config.gradle_command),
            BuildSystem::Unknown => Err(anyhow!("cannot verify a project with unknown build system")),
        }
    }
}

impl BuildTool for CommandBuildTool {
    fn detect(&self, workdir: &Path) -> Result<Vec<BuildDescriptor>> {
        let mut found = Vec::new();
        for (build_system, names) in [
            (BuildSystem::Maven, MAVEN_DESCRIPTORS),
            (BuildSystem::Gradle, GRADLE_DESCRIPTORS),
        ] {
            for name in names {
                if workdir.join(name).is_file() {
                    found.push(BuildDescriptor {
                        build_system,
                        file: (*name).to_string(),
                    });
                }
            }
        }
        Ok(found)
    }

    fn read_versions(&self, workdir: &Path, build_system: BuildSystem) -> Result<ProjectVersions> {
        match build_system {
            BuildSystem::Maven => {
                let path = workdir.join("pom.xml");
                let pom = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                Ok(maven_versions(&pom))
            }
            BuildSystem::Gradle => {
                let mut content = String::new();
                for name in ["build.gradle", "build.gradle.kts", "gradle.properties"] {
                    let path = workdir.join(name);
                    if path.is_file() {
                        let text = fs::read_to_string(&path)
                            .with_context(|| format!("read {}", path.display()))?;
                        content.push_str(&text);
                        content.push('\n');
                    }
                }
                if content.is_empty() {
                    return Err(anyhow!("no Gradle build script found"));
                }
                Ok(gradle_versions(&content))
            }
            BuildSystem::Unknown => Ok(ProjectVersions::default()),
        }
    }

    #[instrument(skip_all, fields(build_system = %build_system, timeout_secs = timeout.as_secs()))]
    fn verify(
        &self,
        workdir: &Path,
        build_system: BuildSystem,
        timeout: Duration,
    ) -> Result<Verification> {
        let argv = self.command_for(build_system)?;
        let cmd = launcher_command(argv, workdir)?;
        info!(command = %argv.join(" "), "running build verification");
        let output = run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
            .with_context(|| format!("run build tool '{}'", argv[0]))?;

        if output.timed_out {
            warn!("build verification timed out");
            let mut verification = Verification::failure(format!(
                "{}\n[build timed out after {}s]",
                output.merged_lossy().trim_end(),
                timeout.as_secs()
            ));
            verification.timed_out = true;
            return Ok(verification);
        }
        if output.status.success() {
            info!("build verification passed");
            return Ok(Verification::success());
        }
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        info!(exit = %code, "build verification failed");
        Ok(Verification::failure(format!(
            "{}\n[build exited with {code}]",
            output.merged_lossy().trim_end()
        )))
    }
}

/// Build a [`Command`] for `argv` run inside `workdir`.
///
/// `mvn` and `gradle` are replaced by the project's `mvnw`/`gradlew` wrapper
/// when one exists; a wrapper without the executable bit runs through `sh`.
pub fn launcher_command(argv: &[String], workdir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let wrapper = match program.as_str() {
        "mvn" => Some("mvnw"),
        "gradle" => Some("gradlew"),
        _ => None,
    }
    .map(|name| workdir.join(name))
    .filter(|path| path.is_file());

    let mut cmd = match wrapper {
        Some(path) if is_executable(&path) => Command::new(path),
        Some(path) => {
            let mut cmd = Command::new("sh");
            cmd.arg(path);
            cmd
        }
        None => Command::new(program),
    };
    cmd.args(args).current_dir(workdir);
    Ok(cmd)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

static MAVEN_JAVA_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"<java\.version>\s*([0-9][0-9.]*)\s*</java\.version>",
        r"<maven\.compiler\.release>\s*([0-9][0-9.]*)\s*</maven\.compiler\.release>",
        r"<maven\.compiler\.source>\s*([0-9][0-9.]*)\s*</maven\.compiler\.source>",
        r"<maven\.compiler\.target>\s*([0-9][0-9.]*)\s*</maven\.compiler\.target>",
        r"<release>\s*([0-9][0-9.]*)\s*</release>",
    ])
});

static MAVEN_PARENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<parent>(.*?)</parent>").expect("parent regex should compile")
});

static MAVEN_VERSION_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<version>\s*([^<\s]+)\s*</version>").expect("version regex should compile")
});

static MAVEN_BOOT_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"<spring-boot\.version>\s*([^<\s]+)\s*</spring-boot\.version>",
        r"(?s)<artifactId>\s*spring-boot-dependencies\s*</artifactId>\s*<version>\s*([^<\s]+)\s*</version>",
    ])
});

static GRADLE_JAVA_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"JavaLanguageVersion\.of\(\s*([0-9]+)\s*\)",
        r#"sourceCompatibility\s*=\s*(?:JavaVersion\.VERSION_)?['"]?([0-9][0-9._]*)['"]?"#,
        r#"targetCompatibility\s*=\s*(?:JavaVersion\.VERSION_)?['"]?([0-9][0-9._]*)['"]?"#,
        r"jvmTarget\s*=\s*['\x22]([0-9][0-9.]*)['\x22]",
    ])
});

static GRADLE_BOOT_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r#"org\.springframework\.boot['"]?\)?\s*version\s*['"]([^'"]+)['"]"#,
        r#"spring-boot-gradle-plugin:([0-9][^'"\s)]*)"#,
        r"springBootVersion\s*=\s*['\x22]?([0-9][^'\x22\s]*)['\x22]?",
    ])
});

// The patterns above are constant; a compile failure is a programming error.
fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("version regex should compile"))
        .collect()
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace('_', "."))
    })
}

/// Version of a `spring-boot-starter-parent` parent block, if any.
fn maven_boot_parent(pom: &str) -> Option<String> {
    let parent = MAVEN_PARENT_RE.captures(pom)?.get(1)?.as_str();
    if !parent.contains("spring-boot-starter-parent") {
        return None;
    }
    MAVEN_VERSION_TAG_RE
        .captures(parent)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn maven_versions(pom: &str) -> ProjectVersions {
    ProjectVersions {
        java: first_capture(&MAVEN_JAVA_RE, pom),
        spring_boot: maven_boot_parent(pom).or_else(|| first_capture(&MAVEN_BOOT_RE, pom)),
    }
}

fn gradle_versions(script: &str) -> ProjectVersions {
    ProjectVersions {
        java: first_capture(&GRADLE_JAVA_RE, script),
        spring_boot: first_capture(&GRADLE_BOOT_RE, script),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POM: &str = r#"<project>
  <parent>
    <groupId>org.springframework.boot</groupId>
    <artifactId>spring-boot-starter-parent</artifactId>
    <version>2.7.18</version>
    <relativePath/>
  </parent>
  <artifactId>demo</artifactId>
  <version>0.0.1-SNAPSHOT</version>
  <properties>
    <java.version>11</java.version>
  </properties>
</project>
"#;

    const GRADLE_KTS: &str = r#"plugins {
    id("org.springframework.boot") version "2.6.3"
    id("io.spring.dependency-management") version "1.0.11.RELEASE"
    java
}
java {
    toolchain {
        languageVersion.set(JavaLanguageVersion.of(11))
    }
}
"#;

    #[test]
    fn reads_maven_parent_and_java_version() {
        let versions = maven_versions(POM);
        assert_eq!(versions.java.as_deref(), Some("11"));
        assert_eq!(versions.spring_boot.as_deref(), Some("2.7.18"));
    }

    #[test]
    fn project_version_is_not_mistaken_for_boot_version() {
        let pom = "<project><artifactId>demo</artifactId><version>1.2.3</version>\
                   <properties><maven.compiler.source>1.8</maven.compiler.source></properties></project>";
        let versions = maven_versions(pom);
        assert_eq!(versions.java.as_deref(), Some("1.8"));
        assert_eq!(versions.spring_boot, None);
    }

    #[test]
    fn reads_gradle_kotlin_dsl() {
        let versions = gradle_versions(GRADLE_KTS);
        assert_eq!(versions.java.as_deref(), Some("11"));
        assert_eq!(versions.spring_boot.as_deref(), Some("2.6.3"));
    }

    #[test]
    fn reads_gradle_groovy_dsl() {
        let script = "plugins {\n  id 'org.springframework.boot' version '2.5.4'\n}\n\
                      sourceCompatibility = JavaVersion.VERSION_1_8\n";
        let versions = gradle_versions(script);
        assert_eq!(versions.java.as_deref(), Some("1.8"));
        assert_eq!(versions.spring_boot.as_deref(), Some("2.5.4"));
    }

    #[test]
    fn detect_reports_every_descriptor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CommandBuildTool::new(&BuildConfig::default(), 4096);
        assert!(tool.detect(temp.path()).expect("detect").is_empty());

        fs::write(temp.path().join("pom.xml"), POM).expect("write pom");
        fs::write(temp.path().join("build.gradle.kts"), GRADLE_KTS).expect("write gradle");
        let found = tool.detect(temp.path()).expect("detect");
        assert_eq!(
            found,
            vec![
                BuildDescriptor {
                    build_system: BuildSystem::Maven,
                    file: "pom.xml".to_string()
                },
                BuildDescriptor {
                    build_system: BuildSystem::Gradle,
                    file: "build.gradle.kts".to_string()
                },
            ]
        );
    }

    #[test]
    fn read_versions_fails_without_descriptor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = CommandBuildTool::new(&BuildConfig::default(), 4096);
        assert!(tool.read_versions(temp.path(), BuildSystem::Maven).is_err());
        assert!(tool.read_versions(temp.path(), BuildSystem::Gradle).is_err());
    }

    #[test]
    fn wrapper_replaces_plain_launcher() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv = vec!["mvn".to_string(), "verify".to_string()];
        let cmd = launcher_command(&argv, temp.path()).expect("command");
        assert_eq!(cmd.get_program(), "mvn");

        fs::write(temp.path().join("mvnw"), "#!/bin/sh\n").expect("write wrapper");
        let cmd = launcher_command(&argv, temp.path()).expect("command");
        assert_ne!(cmd.get_program(), "mvn");
    }

    #[cfg(unix)]
    #[test]
    fn verify_reports_failure_with_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = BuildConfig {
            maven_command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo '[ERROR] cannot find symbol'; exit 1".to_string(),
            ],
            ..BuildConfig::default()
        };
        let tool = CommandBuildTool::new(&config, 4096);
        let verification = tool
            .verify(temp.path(), BuildSystem::Maven, Duration::from_secs(10))
            .expect("verify");
        assert!(!verification.is_success());
        assert!(verification.diagnostic_text.contains("cannot find symbol"));
        assert!(verification.diagnostic_text.ends_with("[build exited with 1]"));
    }

    #[cfg(unix)]
    #[test]
    fn verify_timeout_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = BuildConfig {
            gradle_command: vec!["sh".to_string(), "-c".to_string(), "sleep 5".to_string()],
            ..BuildConfig::default()
        };
        let tool = CommandBuildTool::new(&config, 4096);
        let verification = tool
            .verify(temp.path(), BuildSystem::Gradle, Duration::from_millis(100))
            .expect("verify");
        assert!(!verification.is_success());
        assert!(verification.timed_out);
    }

    #[test]
    fn missing_build_tool_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = BuildConfig {
            maven_command: vec!["upgrader-test-no-such-mvn".to_string()],
            ..BuildConfig::default()
        };
        let tool = CommandBuildTool::new(&config, 4096);
        assert!(
            tool.verify(temp.path(), BuildSystem::Maven, Duration::from_secs(1))
                .is_err()
        );
    }
}
