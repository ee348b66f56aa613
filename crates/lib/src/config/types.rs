//! On-disk shape of `crossforge.toml`.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::toolchain::{ArtifactKind, ToolChain};
use crate::types::NodeRef;

/// The whole build file. Relative paths are taken from its directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildFile {
  /// Root for default destination directories. Defaults to `build`.
  pub build_dir: Option<PathBuf>,
  /// Default tool chain for every project.
  pub tool_chain: Option<ToolChain>,
  /// Root environment scope.
  #[serde(default)]
  pub env: IndexMap<String, String>,
  #[serde(default)]
  pub env_remove: Vec<String>,
  #[serde(default)]
  pub execute: ExecuteSection,
  #[serde(default)]
  pub steps: IndexMap<String, StepSection>,
  #[serde(default)]
  pub projects: IndexMap<String, ProjectSection>,
  pub stage: Option<StageSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteSection {
  pub parallelism: Option<usize>,
  pub fail_fast: Option<bool>,
  pub force: Option<bool>,
  /// Per-invocation deadline, e.g. `"15m"`.
  pub timeout: Option<String>,
}

/// An external step. No command means it is complete already.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSection {
  /// Program followed by its arguments.
  #[serde(default)]
  pub command: Vec<String>,
  pub cwd: Option<PathBuf>,
  #[serde(default)]
  pub depends_on: Vec<NodeRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSection {
  pub source_dir: PathBuf,
  pub destination_dir: Option<PathBuf>,
  pub base_name: Option<String>,
  pub manifest: Option<PathBuf>,
  pub tool_chain: Option<ToolChain>,
  #[serde(default)]
  pub depends_on: Vec<NodeRef>,
  #[serde(default)]
  pub env: IndexMap<String, String>,
  #[serde(default)]
  pub env_remove: Vec<String>,
  /// Keyed by target name, which is also the default triple.
  #[serde(default)]
  pub targets: IndexMap<String, TargetSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSection {
  pub triple: Option<String>,
  pub tool_chain: Option<ToolChain>,
  pub release: Option<bool>,
  pub artifact: Option<ArtifactKind>,
  pub binary_name: Option<String>,
  #[serde(default)]
  pub depends_on: Vec<NodeRef>,
  #[serde(default)]
  pub env: IndexMap<String, String>,
  #[serde(default)]
  pub env_remove: Vec<String>,
  /// Only register this target when the named property is set and not `false`.
  pub when: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSection {
  pub base_name: String,
  pub version: String,
  pub output_dir: PathBuf,
  pub extension: Option<String>,
  /// Classifier to `project:target`.
  #[serde(default)]
  pub classifiers: IndexMap<String, String>,
  pub alias: AliasSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliasSection {
  /// `project:target`
  pub target: String,
  pub name: String,
}
