//! Declarative build files.
//!
//! A `crossforge.toml` describes projects, targets, steps and staging. Loading
//! one registers everything through the same [`Registry`] API a host program
//! would call directly.

pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::env::EnvScope;
use crate::error::ConfigError;
use crate::execute::ExecuteConfig;
use crate::registry::Registry;
use crate::stage::{StageAlias, StagingSpec};
use crate::step::StepAction;
use crate::toolchain::ToolChain;
use crate::types::{NodeRef, TargetId};

pub use types::{AliasSection, BuildFile, ExecuteSection, ProjectSection, StageSection, StepSection, TargetSection};

/// `-P key=value` switches. A bare `-P key` means `key=true`.
pub type Properties = BTreeMap<String, String>;

/// Default for `build_dir`, relative to the build file.
const DEFAULT_BUILD_DIR: &str = "build";

/// A build file turned into runnable objects.
#[derive(Debug)]
pub struct LoadedBuild {
  /// Directory of the build file; relative paths were resolved against it.
  pub root: PathBuf,
  pub registry: Registry,
  pub stage: Option<StagingSpec>,
  pub execute: ExecuteConfig,
}

pub fn parse_property(raw: &str) -> (String, String) {
  match raw.split_once('=') {
    Some((key, value)) => (key.trim().to_string(), value.to_string()),
    None => (raw.trim().to_string(), "true".to_string()),
  }
}

/// Whether a `when` condition holds.
pub fn is_enabled(when: Option<&str>, properties: &Properties) -> bool {
  match when {
    None => true,
    Some(key) => properties.get(key).is_some_and(|value| value != "false"),
  }
}

pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
  humantime::parse_duration(value).map_err(|e| ConfigError::InvalidDuration {
    value: value.to_string(),
    message: e.to_string(),
  })
}

pub fn parse(content: &str, path: &Path) -> Result<BuildFile, ConfigError> {
  toml::from_str(content).map_err(|source| ConfigError::ParseBuildFile {
    path: path.to_path_buf(),
    source: Box::new(source),
  })
}

/// Read, parse and register a build file.
pub fn load(path: &Path, properties: &Properties) -> Result<LoadedBuild, ConfigError> {
  let read_error = |source| ConfigError::ReadBuildFile {
    path: path.to_path_buf(),
    source,
  };

  let content = std::fs::read_to_string(path).map_err(read_error)?;
  let file = parse(&content, path)?;

  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  let root = dunce::canonicalize(parent).map_err(read_error)?;

  debug!(path = %path.display(), root = %root.display(), "loaded build file");
  from_build_file(file, &root, properties)
}

/// Register the contents of a parsed build file.
pub fn from_build_file(file: BuildFile, root: &Path, properties: &Properties) -> Result<LoadedBuild, ConfigError> {
  let build_dir = resolve_path(root, file.build_dir.as_deref().unwrap_or(Path::new(DEFAULT_BUILD_DIR)));
  let mut registry = Registry::new(build_dir);

  if let Some(tool_chain) = file.tool_chain {
    registry.set_tool_chain(resolve_tool_chain(root, tool_chain));
  }
  apply_env(registry.env(), file.env, file.env_remove);

  for (name, step) in file.steps {
    let action = match step.command.split_first() {
      None => StepAction::Completed,
      Some((program, args)) => StepAction::Command {
        program: resolve_program(root, program),
        args: args.to_vec(),
        cwd: Some(step.cwd.as_deref().map_or_else(|| root.to_path_buf(), |cwd| resolve_path(root, cwd))),
      },
    };
    registry.new_step(&name, action, |s| {
      s.depends_on = step.depends_on;
    })?;
  }

  for (name, project) in file.projects {
    registry.new_project(&name, |p| {
      p.source_dir(resolve_path(root, &project.source_dir));
      if let Some(dir) = &project.destination_dir {
        p.destination_dir(resolve_path(root, dir));
      }
      if let Some(base_name) = project.base_name {
        p.base_name(base_name);
      }
      if let Some(manifest) = project.manifest {
        p.manifest(manifest);
      }
      if let Some(tool_chain) = project.tool_chain {
        p.tool_chain(resolve_tool_chain(root, tool_chain));
      }
      p.config.depends_on = project.depends_on;
      apply_env(p.env(), project.env, project.env_remove);
    })?;

    for (target_name, target) in project.targets {
      if !is_enabled(target.when.as_deref(), properties) {
        debug!(project = %name, target = %target_name, when = ?target.when, "target disabled");
        continue;
      }
      registry.new_target(&name, &target_name, |t| {
        t.config.triple = target.triple;
        t.config.tool_chain = target.tool_chain.map(|tc| resolve_tool_chain(root, tc));
        t.config.release = target.release;
        t.config.artifact = target.artifact;
        t.config.binary_name = target.binary_name;
        t.config.depends_on = target.depends_on;
        apply_env(t.env(), target.env, target.env_remove);
      })?;
    }
  }

  let stage = file.stage.map(|stage| staging_spec(root, stage)).transpose()?;
  let execute = execute_config(&file.execute)?;

  Ok(LoadedBuild {
    root: root.to_path_buf(),
    registry,
    stage,
    execute,
  })
}

fn execute_config(section: &ExecuteSection) -> Result<ExecuteConfig, ConfigError> {
  let mut config = ExecuteConfig::default();
  if let Some(parallelism) = section.parallelism {
    config.parallelism = parallelism.max(1);
  }
  if let Some(fail_fast) = section.fail_fast {
    config.fail_fast = fail_fast;
  }
  if let Some(force) = section.force {
    config.force = force;
  }
  if let Some(timeout) = &section.timeout {
    config.timeout = Some(parse_duration(timeout)?);
  }
  Ok(config)
}

fn staging_spec(root: &Path, stage: StageSection) -> Result<StagingSpec, ConfigError> {
  let alias = StageAlias {
    target: parse_target_id(&stage.alias.target)?,
    name: stage.alias.name,
  };
  let mut spec = StagingSpec::new(stage.base_name, stage.version, resolve_path(root, &stage.output_dir), alias);
  if let Some(extension) = stage.extension {
    spec = spec.extension(extension);
  }
  for (classifier, target) in stage.classifiers {
    spec = spec.classifier(classifier, parse_target_id(&target)?);
  }
  Ok(spec)
}

/// `project:target`, nothing else.
pub fn parse_target_id(raw: &str) -> Result<TargetId, ConfigError> {
  match raw.parse::<NodeRef>()? {
    NodeRef::Target(id) => Ok(id),
    _ => Err(ConfigError::InvalidReference(raw.to_string())),
  }
}

fn apply_env(scope: &EnvScope, vars: impl IntoIterator<Item = (String, String)>, remove: Vec<String>) {
  scope.set_all(vars.into_iter().map(|(k, v)| (k, Some(v))));
  for name in remove {
    scope.unset(name);
  }
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() { path.to_path_buf() } else { root.join(path) }
}

fn resolve_tool_chain(root: &Path, tool_chain: ToolChain) -> ToolChain {
  match tool_chain {
    ToolChain::Custom(path) => ToolChain::Custom(resolve_program(root, &path.to_string_lossy())),
    other => other,
  }
}

/// Bare program names stay as they are and are looked up on the search path.
fn resolve_program(root: &Path, program: &str) -> PathBuf {
  let path = Path::new(program);
  if path.components().count() > 1 {
    resolve_path(root, path)
  } else {
    path.to_path_buf()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const LAUNCHER: &str = r#"
build_dir = "out"
tool_chain = "cross"

[env]
CARGO_TERM_COLOR = "never"

[execute]
parallelism = 2
fail_fast = true
timeout = "15m"

[steps.copy-jar]
command = ["./gradlew", "copyJar"]

[projects.launcher]
source_dir = "native"
base_name = "protoc-gen-lw-java"
depends_on = ["step:copy-jar"]
env_remove = ["RUSTC_WRAPPER"]

[projects.launcher.targets.current]
tool_chain = "default"

[projects.launcher.targets.aarch64-unknown-linux-gnu]
when = "cross"

[projects.launcher.targets.aarch64-apple-darwin]
when = "cross"
tool_chain = "default"

[projects.launcher.targets.x86_64-pc-windows-gnu]
when = "cross"

[projects.launcher.targets.x86_64-pc-windows-gnu.env]
CC = "x86_64-w64-mingw32-gcc"

[stage]
base_name = "protoc-gen-lw-java"
version = "1.0.0"
output_dir = "out/libs"
classifiers = { "linux-aarch_64" = "launcher:aarch64-unknown-linux-gnu", "windows-x86_64" = "launcher:x86_64-pc-windows-gnu" }
alias = { target = "launcher:current", name = "protoc-gen-lw-java" }
"#;

  fn write_build(content: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("native")).unwrap();
    let path = temp.path().join("crossforge.toml");
    std::fs::write(&path, content).unwrap();
    (temp, path)
  }

  fn cross() -> Properties {
    Properties::from([parse_property("cross")])
  }

  #[test]
  fn properties_parse_with_and_without_values() {
    assert_eq!(parse_property("cross"), ("cross".to_string(), "true".to_string()));
    assert_eq!(parse_property("version=1.2=3"), ("version".to_string(), "1.2=3".to_string()));
  }

  #[test]
  fn when_requires_a_property_that_is_not_false() {
    let mut props = Properties::new();
    assert!(is_enabled(None, &props));
    assert!(!is_enabled(Some("cross"), &props));
    props.insert("cross".to_string(), "false".to_string());
    assert!(!is_enabled(Some("cross"), &props));
    props.insert("cross".to_string(), "yes".to_string());
    assert!(is_enabled(Some("cross"), &props));
  }

  #[test]
  fn conditional_targets_follow_properties() {
    let (_temp, path) = write_build(LAUNCHER);

    let plain = load(&path, &Properties::new()).unwrap();
    let names: Vec<&str> = plain
      .registry
      .project("launcher")
      .unwrap()
      .targets()
      .map(|t| t.name())
      .collect();
    assert_eq!(names, vec!["current"]);

    let cross = load(&path, &cross()).unwrap();
    assert_eq!(cross.registry.project("launcher").unwrap().targets().count(), 4);
  }

  #[test]
  fn paths_resolve_against_the_build_file() {
    let (temp, path) = write_build(LAUNCHER);
    let root = dunce::canonicalize(temp.path()).unwrap();

    let loaded = load(&path, &cross()).unwrap();

    assert_eq!(loaded.root, root);
    assert_eq!(loaded.registry.build_dir(), root.join("out"));
    let project = loaded.registry.project("launcher").unwrap();
    assert_eq!(project.config.source_dir, Some(root.join("native")));

    let step = loaded.registry.steps().next().unwrap();
    match &step.action {
      StepAction::Command { program, args, cwd } => {
        assert_eq!(program, &root.join("gradlew"));
        assert_eq!(args, &vec!["copyJar".to_string()]);
        assert_eq!(cwd.as_deref(), Some(root.as_path()));
      }
      other => panic!("unexpected action {other:?}"),
    }

    let stage = loaded.stage.unwrap();
    assert_eq!(stage.output_dir, root.join("out/libs"));
    assert_eq!(stage.extension, "exe");
    assert_eq!(stage.classifiers.len(), 2);
    assert_eq!(stage.alias.target, TargetId::new("launcher", "current"));
  }

  #[test]
  fn settings_and_environment_are_registered() {
    let (_temp, path) = write_build(LAUNCHER);
    let loaded = load(&path, &cross()).unwrap();

    assert_eq!(loaded.execute.parallelism, 2);
    assert!(loaded.execute.fail_fast);
    assert_eq!(loaded.execute.timeout, Some(Duration::from_secs(15 * 60)));

    let project = loaded.registry.project("launcher").unwrap();
    assert_eq!(project.config.tool_chain, None);
    assert_eq!(project.config.depends_on, vec![NodeRef::step("copy-jar")]);

    let current = project.target("current").unwrap();
    assert_eq!(current.config.tool_chain, Some(ToolChain::Default));

    let windows = project.target("x86_64-pc-windows-gnu").unwrap().env().all_environment();
    assert_eq!(windows.get("CC"), Some("x86_64-w64-mingw32-gcc"));
    assert_eq!(windows.get("CARGO_TERM_COLOR"), Some("never"));
    assert!(windows.unset.contains("RUSTC_WRAPPER"));
  }

  #[test]
  fn unknown_keys_are_rejected() {
    let (_temp, path) = write_build("[projects.launcher]\nsource_dir = \"native\"\nsorce = 1\n");
    assert!(matches!(
      load(&path, &Properties::new()),
      Err(ConfigError::ParseBuildFile { .. })
    ));
  }

  #[test]
  fn bad_timeout_is_reported() {
    let (_temp, path) = write_build("[execute]\ntimeout = \"soon\"\n");
    assert!(matches!(
      load(&path, &Properties::new()),
      Err(ConfigError::InvalidDuration { ref value, .. }) if value == "soon"
    ));
  }

  #[test]
  fn missing_file_is_a_read_error() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
      load(&temp.path().join("crossforge.toml"), &Properties::new()),
      Err(ConfigError::ReadBuildFile { .. })
    ));
  }

  #[test]
  fn staging_needs_target_references() {
    assert!(parse_target_id("launcher:current").is_ok());
    assert!(matches!(
      parse_target_id("launcher"),
      Err(ConfigError::InvalidReference(_))
    ));
    assert!(parse_target_id("step:copy-jar").is_err());
  }

  #[test]
  fn empty_file_uses_defaults() {
    let (temp, path) = write_build("");
    let loaded = load(&path, &Properties::new()).unwrap();
    assert_eq!(
      loaded.registry.build_dir(),
      dunce::canonicalize(temp.path()).unwrap().join("build")
    );
    assert!(loaded.stage.is_none());
    assert!(!loaded.execute.fail_fast);
  }
}
