//! Build targets: one (project, platform) compilation unit.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::consts::{CURRENT_TARGET, STATE_DIR_NAME};
use crate::env::{EnvScope, ResolvedEnvironment};
use crate::error::ConfigError;
use crate::toolchain::{self, ArtifactKind, ResolvedToolChain, ToolChain};
use crate::types::{NodeRef, TargetId};

/// Per-target settings. `None` falls back to the project, then to the
/// built-in defaults, when the plan is finalized.
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
  /// Platform triple. Defaults to the target's name.
  pub triple: Option<String>,
  pub tool_chain: Option<ToolChain>,
  /// Defaults to `true`.
  pub release: Option<bool>,
  pub artifact: Option<ArtifactKind>,
  /// File stem of the produced binary. Defaults to the project's base name.
  pub binary_name: Option<String>,
  pub depends_on: Vec<NodeRef>,
}

#[derive(Debug)]
pub struct Target {
  name: String,
  pub config: TargetConfig,
  env: EnvScope,
}

impl Target {
  pub(crate) fn new(name: String, env: EnvScope) -> Self {
    Self {
      name,
      config: TargetConfig::default(),
      env,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// This target's environment scope. It already extends the project scope.
  pub fn env(&self) -> &EnvScope {
    &self.env
  }

  pub fn depends_on(&mut self, node: impl Into<NodeRef>) -> &mut Self {
    self.config.depends_on.push(node.into());
    self
  }

  pub fn triple(&mut self, triple: impl Into<String>) -> &mut Self {
    self.config.triple = Some(triple.into());
    self
  }

  pub fn tool_chain(&mut self, tool_chain: ToolChain) -> &mut Self {
    self.config.tool_chain = Some(tool_chain);
    self
  }

  pub fn release(&mut self, release: bool) -> &mut Self {
    self.config.release = Some(release);
    self
  }
}

/// `""` and `"current"` both mean the host platform.
pub fn normalize_triple(triple: &str) -> Option<&str> {
  match triple {
    "" | CURRENT_TARGET => None,
    other => Some(other),
  }
}

/// Project-level values a target inherits, already resolved.
#[derive(Debug, Clone)]
pub(crate) struct ProjectDefaults {
  pub source_dir: PathBuf,
  pub destination_root: PathBuf,
  pub base_name: String,
  pub manifest_path: PathBuf,
  pub tool_chain: ToolChain,
  pub depends_on: Vec<NodeRef>,
}

/// A target with every default applied. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTarget {
  pub id: TargetId,
  /// `None` for the host platform.
  pub triple: Option<String>,
  pub tool_chain: ResolvedToolChain,
  pub release: bool,
  pub artifact: ArtifactKind,
  pub source_dir: PathBuf,
  pub manifest_path: PathBuf,
  pub destination_root: PathBuf,
  pub output_dir: PathBuf,
  pub binary_path: PathBuf,
  pub environment: ResolvedEnvironment,
  pub depends_on: Vec<NodeRef>,
}

/// Everything that decides whether a previous build can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSet<'a> {
  pub source_dir: &'a Path,
  pub manifest_path: &'a Path,
  pub tool_chain: String,
  pub triple: Option<&'a str>,
  pub release: bool,
  pub artifact: ArtifactKind,
  pub binary_path: &'a Path,
  pub environment: &'a ResolvedEnvironment,
  pub args: Vec<String>,
}

/// Files a target promises to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSet<'a> {
  pub output_dir: &'a Path,
  pub binary_path: &'a Path,
}

impl ResolvedTarget {
  pub(crate) fn resolve(
    project: &str,
    target: &Target,
    defaults: &ProjectDefaults,
    tool_chains: &mut impl FnMut(&ToolChain) -> Result<ResolvedToolChain, ConfigError>,
  ) -> Result<Self, ConfigError> {
    let config = &target.config;
    let triple = normalize_triple(config.triple.as_deref().unwrap_or(&target.name)).map(str::to_string);
    let release = config.release.unwrap_or(true);
    let artifact = config.artifact.unwrap_or_default();
    let binary_name = config.binary_name.as_deref().unwrap_or(&defaults.base_name);

    // Unknown triples fail here, before any tool chain lookup.
    let file_name = toolchain::file_name(triple.as_deref(), artifact, binary_name)?;

    let tool_chain = tool_chains(config.tool_chain.as_ref().unwrap_or(&defaults.tool_chain))?;

    let mut output_dir = defaults.destination_root.clone();
    if let Some(triple) = &triple {
      output_dir.push(triple);
    }
    output_dir.push(mode_dir(release));
    let binary_path = output_dir.join(file_name);

    let mut depends_on = defaults.depends_on.clone();
    depends_on.extend(config.depends_on.iter().cloned());

    Ok(Self {
      id: TargetId::new(project, &target.name),
      triple,
      tool_chain,
      release,
      artifact,
      source_dir: defaults.source_dir.clone(),
      manifest_path: defaults.manifest_path.clone(),
      destination_root: defaults.destination_root.clone(),
      output_dir,
      binary_path,
      environment: target.env.all_environment(),
      depends_on,
    })
  }

  /// `release` or `debug`.
  pub fn mode(&self) -> &'static str {
    mode_dir(self.release)
  }

  /// Arguments passed to the tool chain executable.
  ///
  /// `build [--target <triple>] [--release] --target-dir <root> --manifest-path <manifest>`
  pub fn args(&self) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["build".into()];
    if let Some(triple) = &self.triple {
      args.push("--target".into());
      args.push(triple.into());
    }
    if self.release {
      args.push("--release".into());
    }
    args.push("--target-dir".into());
    args.push(self.destination_root.clone().into_os_string());
    args.push("--manifest-path".into());
    args.push(self.manifest_arg().into_os_string());
    args
  }

  /// The manifest relative to the working directory when it lies inside it.
  fn manifest_arg(&self) -> PathBuf {
    match self.manifest_path.strip_prefix(&self.source_dir) {
      Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
      _ => self.manifest_path.clone(),
    }
  }

  /// Printable command line, for plans and error messages.
  pub fn command_line(&self) -> String {
    std::iter::once(self.tool_chain.executable.as_os_str().to_os_string())
      .chain(self.args())
      .map(|a| a.to_string_lossy().into_owned())
      .collect::<Vec<_>>()
      .join(" ")
  }

  pub fn inputs(&self) -> InputSet<'_> {
    InputSet {
      source_dir: &self.source_dir,
      manifest_path: &self.manifest_path,
      tool_chain: self.tool_chain.identity(),
      triple: self.triple.as_deref(),
      release: self.release,
      artifact: self.artifact,
      binary_path: &self.binary_path,
      environment: &self.environment,
      args: self.args().iter().map(|a| a.to_string_lossy().into_owned()).collect(),
    }
  }

  pub fn outputs(&self) -> OutputSet<'_> {
    OutputSet {
      output_dir: &self.output_dir,
      binary_path: &self.binary_path,
    }
  }

  /// Where the fingerprint of the last successful build is kept.
  pub fn state_file(&self) -> PathBuf {
    self
      .destination_root
      .join(STATE_DIR_NAME)
      .join(format!("{}-{}.json", self.id.project, self.id.target))
  }
}

fn mode_dir(release: bool) -> &'static str {
  if release { "release" } else { "debug" }
}
