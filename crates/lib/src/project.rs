//! Projects: a source tree built for one or more targets.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::consts::{CURRENT_TARGET, DEFAULT_MANIFEST, NATIVE_DIR_NAME};
use crate::env::EnvScope;
use crate::error::ConfigError;
use crate::target::{ProjectDefaults, Target};
use crate::toolchain::ToolChain;
use crate::types::NodeRef;

/// Project-level settings, resolved once by [`crate::Registry::plan`].
#[derive(Debug, Clone, Default)]
pub struct ProjectConfig {
  /// Directory holding the manifest. Required, and must exist.
  pub source_dir: Option<PathBuf>,
  /// Root of all target output. Defaults to `<build_dir>/native/<project>`.
  pub destination_dir: Option<PathBuf>,
  /// Binary file stem. Defaults to the source directory's name.
  pub base_name: Option<String>,
  /// Defaults to `Cargo.toml`; relative paths are taken from `source_dir`.
  pub manifest: Option<PathBuf>,
  pub tool_chain: Option<ToolChain>,
  /// Prerequisites shared by every target of this project.
  pub depends_on: Vec<NodeRef>,
}

#[derive(Debug)]
pub struct Project {
  name: String,
  pub config: ProjectConfig,
  env: EnvScope,
  targets: IndexMap<String, Target>,
}

impl Project {
  pub(crate) fn new(name: String, env: EnvScope) -> Self {
    Self {
      name,
      config: ProjectConfig::default(),
      env,
      targets: IndexMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// The project's environment scope. Every target scope extends it.
  pub fn env(&self) -> &EnvScope {
    &self.env
  }

  pub fn source_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
    self.config.source_dir = Some(path.into());
    self
  }

  pub fn destination_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
    self.config.destination_dir = Some(path.into());
    self
  }

  pub fn base_name(&mut self, name: impl Into<String>) -> &mut Self {
    self.config.base_name = Some(name.into());
    self
  }

  pub fn manifest(&mut self, path: impl Into<PathBuf>) -> &mut Self {
    self.config.manifest = Some(path.into());
    self
  }

  pub fn tool_chain(&mut self, tool_chain: ToolChain) -> &mut Self {
    self.config.tool_chain = Some(tool_chain);
    self
  }

  pub fn depends_on(&mut self, node: impl Into<NodeRef>) -> &mut Self {
    self.config.depends_on.push(node.into());
    self
  }

  /// Register a target and configure it immediately.
  ///
  /// The name is the platform triple unless the configuration sets one;
  /// `""` is stored as `"current"`.
  pub fn new_target(&mut self, name: &str, configure: impl FnOnce(&mut Target)) -> Result<&mut Target, ConfigError> {
    let name = if name.is_empty() { CURRENT_TARGET } else { name };
    if self.targets.contains_key(name) {
      return Err(ConfigError::DuplicateTarget {
        project: self.name.clone(),
        target: name.to_string(),
      });
    }

    let env = EnvScope::new();
    env.extends_from(&self.env)?;

    let mut target = Target::new(name.to_string(), env);
    configure(&mut target);

    Ok(self.targets.entry(name.to_string()).or_insert(target))
  }

  pub fn target(&self, name: &str) -> Option<&Target> {
    self.targets.get(name)
  }

  pub fn target_mut(&mut self, name: &str) -> Option<&mut Target> {
    self.targets.get_mut(name)
  }

  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.targets.values()
  }

  pub(crate) fn defaults(&self, build_dir: &Path, tool_chain: &ToolChain) -> Result<ProjectDefaults, ConfigError> {
    let source_dir = self.config.source_dir.as_deref().ok_or_else(|| ConfigError::NoSourceDir {
      project: self.name.clone(),
    })?;
    if !source_dir.is_dir() {
      return Err(ConfigError::MissingSourceDir {
        project: self.name.clone(),
        path: source_dir.to_path_buf(),
      });
    }
    // The tool chain runs inside the source directory, so every path handed to
    // it or checked afterwards must not depend on the working directory.
    let source_dir = self.absolute(source_dir)?;

    let destination_root = match &self.config.destination_dir {
      Some(dir) => self.absolute(dir)?,
      None => self.absolute(&build_dir.join(NATIVE_DIR_NAME).join(&self.name))?,
    };

    let base_name = match &self.config.base_name {
      Some(name) => name.clone(),
      None => source_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| self.name.clone()),
    };

    let manifest = self.config.manifest.as_deref().unwrap_or(Path::new(DEFAULT_MANIFEST));
    let manifest_path = source_dir.join(manifest);

    Ok(ProjectDefaults {
      source_dir,
      destination_root,
      base_name,
      manifest_path,
      tool_chain: self.config.tool_chain.clone().unwrap_or_else(|| tool_chain.clone()),
      depends_on: self.config.depends_on.clone(),
    })
  }

  fn absolute(&self, path: &Path) -> Result<PathBuf, ConfigError> {
    crate::util::path::absolute(path).map_err(|source| ConfigError::ResolvePath {
      project: self.name.clone(),
      path: path.to_path_buf(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn project(name: &str) -> Project {
    Project::new(name.to_string(), EnvScope::new())
  }

  #[test]
  fn duplicate_target_is_rejected() {
    let mut p = project("native");
    p.new_target("current", |_| {}).unwrap();
    let err = p.new_target("current", |_| {}).unwrap_err();
    assert!(matches!(
      err,
      ConfigError::DuplicateTarget { ref project, ref target } if project == "native" && target == "current"
    ));
  }

  #[test]
  fn empty_name_means_current() {
    let mut p = project("native");
    p.new_target("", |_| {}).unwrap();
    assert!(p.target("current").is_some());
    assert!(p.new_target("current", |_| {}).is_err());
  }

  #[test]
  fn configure_runs_immediately() {
    let mut p = project("native");
    let target = p
      .new_target("current", |t| {
        t.release(false);
      })
      .unwrap();
    assert_eq!(target.config.release, Some(false));
  }

  #[test]
  fn target_env_inherits_project_env_set_later() {
    let mut p = project("native");
    p.new_target("current", |_| {}).unwrap();
    p.env().set("LATE", Some("1"));

    let env = p.target("current").unwrap().env().all_environment();
    assert_eq!(env.get("LATE"), Some("1"));
  }

  #[test]
  fn targets_keep_registration_order() {
    let mut p = project("native");
    for name in ["current", "x86_64-pc-windows-gnu", "aarch64-apple-darwin"] {
      p.new_target(name, |_| {}).unwrap();
    }
    let names: Vec<&str> = p.targets().map(Target::name).collect();
    assert_eq!(names, vec!["current", "x86_64-pc-windows-gnu", "aarch64-apple-darwin"]);
  }

  #[test]
  fn defaults_follow_conventions() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("launcher");
    std::fs::create_dir(&source).unwrap();

    let mut p = project("native");
    p.source_dir(&source);
    let defaults = p.defaults(Path::new("/build"), &ToolChain::Default).unwrap();

    assert_eq!(defaults.base_name, "launcher");
    assert_eq!(defaults.destination_root, PathBuf::from("/build/native/native"));
    assert_eq!(defaults.manifest_path, source.join("Cargo.toml"));
    assert_eq!(defaults.tool_chain, ToolChain::Default);
  }

  #[test]
  fn relative_dirs_are_anchored_to_the_working_directory() {
    // Tests run from the crate directory, which has a `src`.
    let cwd = std::env::current_dir().unwrap();
    let mut p = project("native");
    p.source_dir("./src/../src").destination_dir("out/../build/native");
    let defaults = p.defaults(Path::new("build"), &ToolChain::Default).unwrap();

    assert_eq!(defaults.source_dir, cwd.join("src"));
    assert_eq!(defaults.base_name, "src");
    assert_eq!(defaults.manifest_path, cwd.join("src/Cargo.toml"));
    assert_eq!(defaults.destination_root, cwd.join("build/native"));

    let mut p = project("native");
    p.source_dir("src");
    let defaults = p.defaults(Path::new("build"), &ToolChain::Default).unwrap();
    assert!(defaults.destination_root.is_absolute());
    assert_eq!(defaults.destination_root, cwd.join("build/native/native"));
  }

  #[test]
  fn missing_source_dir_is_reported() {
    let mut p = project("native");
    assert!(matches!(
      p.defaults(Path::new("/build"), &ToolChain::Default),
      Err(ConfigError::NoSourceDir { .. })
    ));

    p.source_dir("/definitely/not/here");
    assert!(matches!(
      p.defaults(Path::new("/build"), &ToolChain::Default),
      Err(ConfigError::MissingSourceDir { .. })
    ));
  }
}
