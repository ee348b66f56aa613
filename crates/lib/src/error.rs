//! Configuration-time errors.
//!
//! Everything in here is detected before any subprocess runs. A `ConfigError`
//! always aborts the whole run and names the offending project, target, step
//! or triple.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  /// No toolchain executable could be found and none was given explicitly.
  #[error("{requirement} tool chain not found, so it's required to set the tool chain manually")]
  ToolChainNotFound { requirement: String },

  /// The naming function doesn't know this platform.
  #[error("unknown platform triple: {triple}")]
  UnknownTriple { triple: String },

  /// The host OS or architecture has no naming convention.
  #[error("unsupported host platform: {os}-{arch}")]
  UnsupportedHost { os: String, arch: String },

  #[error("project {0} is already registered")]
  DuplicateProject(String),

  #[error("target {target} is already registered in project {project}")]
  DuplicateTarget { project: String, target: String },

  #[error("step {0} is already registered")]
  DuplicateStep(String),

  #[error("project {0} is not registered")]
  UnknownProject(String),

  #[error("{from} depends on {to}, which is not registered")]
  UnknownDependency { from: String, to: String },

  /// A cycle in the dependency graph. Every participating node is named.
  #[error("dependency cycle detected between: {}", nodes.join(", "))]
  DependencyCycle { nodes: Vec<String> },

  #[error("environment scope would inherit from itself")]
  EnvironmentCycle,

  #[error("project {project}: source directory {} does not exist", .path.display())]
  MissingSourceDir { project: String, path: PathBuf },

  #[error("project {project}: no source directory configured")]
  NoSourceDir { project: String },

  /// A relative path couldn't be anchored to the working directory.
  #[error("project {project}: cannot resolve {}: {source}", .path.display())]
  ResolvePath {
    project: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Two targets of one project would write the same binary.
  #[error("targets {first} and {second} both resolve to {}", .path.display())]
  OutputCollision {
    first: String,
    second: String,
    path: PathBuf,
  },

  #[error("staging refers to {target}, which is not a registered target")]
  UnknownStagingTarget { target: String },

  /// The alias copy has to come from the host build.
  #[error("staging alias must be a host build, but {target} targets {triple}")]
  AliasNotHost { target: String, triple: String },

  #[error("invalid node reference: {0}")]
  InvalidReference(String),

  #[error("failed to read build file {}: {source}", .path.display())]
  ReadBuildFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse build file {}: {source}", .path.display())]
  ParseBuildFile {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("invalid duration {value:?}: {message}")]
  InvalidDuration { value: String, message: String },
}
