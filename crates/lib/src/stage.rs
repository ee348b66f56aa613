//! Artifact staging.
//!
//! Copies finished target binaries into one distribution directory under
//! conventional names: `<base>-<version>-<classifier>.<ext>` per classifier,
//! plus a single classifier-free alias of one designated target.

use std::collections::HashSet;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::consts::DEFAULT_STAGE_EXTENSION;
use crate::error::ConfigError;
use crate::execute::{self, ContractViolation, ExecuteConfig, ExecuteError, RunReport};
use crate::plan::BuildPlan;
use crate::registry::Registry;
use crate::types::{NodeRef, TargetId};

/// The extra, classifier-free copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAlias {
  pub target: TargetId,
  /// Complete file name, used as is.
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingSpec {
  pub base_name: String,
  pub version: String,
  pub output_dir: PathBuf,
  /// Without the dot. Empty means no extension.
  pub extension: String,
  /// Classifier to target, in staging order.
  pub classifiers: IndexMap<String, TargetId>,
  pub alias: StageAlias,
}

/// One planned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCopy {
  /// Classifier, or the alias name for the alias copy.
  pub label: String,
  pub source: PathBuf,
  pub destination: PathBuf,
}

impl StagingSpec {
  pub fn new(
    base_name: impl Into<String>,
    version: impl Into<String>,
    output_dir: impl Into<PathBuf>,
    alias: StageAlias,
  ) -> Self {
    Self {
      base_name: base_name.into(),
      version: version.into(),
      output_dir: output_dir.into(),
      extension: DEFAULT_STAGE_EXTENSION.to_string(),
      classifiers: IndexMap::new(),
      alias,
    }
  }

  pub fn classifier(mut self, classifier: impl Into<String>, target: TargetId) -> Self {
    self.classifiers.insert(classifier.into(), target);
    self
  }

  pub fn extension(mut self, extension: impl Into<String>) -> Self {
    self.extension = extension.into();
    self
  }

  /// `<base>-<version>-<classifier>.<ext>`
  pub fn file_name(&self, classifier: &str) -> String {
    let stem = format!("{}-{}-{}", self.base_name, self.version, classifier);
    if self.extension.is_empty() {
      stem
    } else {
      format!("{stem}.{}", self.extension)
    }
  }

  /// Every target this staging reads from, each once.
  pub fn targets(&self) -> Vec<TargetId> {
    let mut seen = HashSet::new();
    self
      .classifiers
      .values()
      .chain(std::iter::once(&self.alias.target))
      .filter(|id| seen.insert(*id))
      .cloned()
      .collect()
  }

  /// Check every referenced target exists in the plan and that the alias
  /// copy comes from a host build.
  pub fn validate(&self, plan: &BuildPlan) -> Result<(), ConfigError> {
    for id in self.targets() {
      if plan.target(&id).is_none() {
        return Err(ConfigError::UnknownStagingTarget { target: id.to_string() });
      }
    }
    if let Some(triple) = plan.target(&self.alias.target).and_then(|t| t.triple.as_deref()) {
      return Err(ConfigError::AliasNotHost {
        target: self.alias.target.to_string(),
        triple: triple.to_string(),
      });
    }
    Ok(())
  }

  /// The N classifier copies followed by the alias copy.
  pub fn copies(&self, plan: &BuildPlan) -> Result<Vec<StagedCopy>, ConfigError> {
    self.validate(plan)?;

    let binary = |id: &TargetId| {
      plan
        .target(id)
        .map(|t| t.binary_path.clone())
        .ok_or_else(|| ConfigError::UnknownStagingTarget { target: id.to_string() })
    };

    let mut copies = Vec::with_capacity(self.classifiers.len() + 1);
    for (classifier, id) in &self.classifiers {
      copies.push(StagedCopy {
        label: classifier.clone(),
        source: binary(id)?,
        destination: self.output_dir.join(self.file_name(classifier)),
      });
    }
    copies.push(StagedCopy {
      label: self.alias.name.clone(),
      source: binary(&self.alias.target)?,
      destination: self.output_dir.join(&self.alias.name),
    });
    Ok(copies)
  }
}

/// Copy the finished binaries into the staging directory.
///
/// Every source is checked before anything is copied, so a missing binary
/// leaves the directory untouched. Returns the written paths.
pub async fn stage_artifacts(spec: &StagingSpec, plan: &BuildPlan) -> Result<Vec<PathBuf>, ExecuteError> {
  let copies = spec.copies(plan)?;

  for copy in &copies {
    if !copy.source.is_file() {
      return Err(
        ContractViolation::MissingStagingSource {
          classifier: copy.label.clone(),
          path: copy.source.clone(),
        }
        .into(),
      );
    }
  }

  fs::create_dir_all(&spec.output_dir).await?;

  let mut staged = Vec::with_capacity(copies.len());
  for copy in copies {
    debug!(
      label = %copy.label,
      from = %copy.source.display(),
      to = %copy.destination.display(),
      "staging artifact"
    );
    fs::copy(&copy.source, &copy.destination).await?;
    staged.push(copy.destination);
  }

  info!(count = staged.len(), dir = %spec.output_dir.display(), "staged artifacts");
  Ok(staged)
}

/// A build of the staged targets followed by staging.
#[derive(Debug)]
pub struct ReleaseReport {
  pub run: RunReport,
  /// Empty when the build didn't succeed.
  pub staged: Vec<PathBuf>,
}

/// Build exactly what `spec` needs, then stage it.
pub async fn release(
  registry: &Registry,
  spec: &StagingSpec,
  config: &ExecuteConfig,
) -> Result<ReleaseReport, ExecuteError> {
  let plan = registry.plan()?;
  spec.validate(&plan)?;

  let roots: Vec<NodeRef> = spec.targets().into_iter().map(NodeRef::from).collect();
  let selection = plan.closure(&roots)?;
  let run = execute::execute_nodes(&plan, Some(&selection), config).await;

  if !run.is_success() {
    warn!("build failed, nothing staged");
    return Ok(ReleaseReport { run, staged: Vec::new() });
  }

  let staged = stage_artifacts(spec, &plan).await?;
  Ok(ReleaseReport { run, staged })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::toolchain::ToolChain;
  use tempfile::TempDir;

  const CLASSIFIED: [(&str, &str); 3] = [
    ("linux-x86_64", "x86_64-unknown-linux-gnu"),
    ("osx-aarch_64", "aarch64-apple-darwin"),
    ("windows-x86_64", "x86_64-pc-windows-gnu"),
  ];

  fn fixture() -> (TempDir, BuildPlan, StagingSpec) {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("launcher");
    std::fs::create_dir(&source).unwrap();

    let mut registry = Registry::new(temp.path().join("build"));
    registry.set_tool_chain(ToolChain::custom("/opt/cargo"));
    let project = registry
      .new_project("launcher", |p| {
        p.source_dir(&source).base_name("app");
      })
      .unwrap();
    project.new_target("current", |_| {}).unwrap();
    for (_, triple) in CLASSIFIED {
      project.new_target(triple, |_| {}).unwrap();
    }

    let plan = registry.plan().unwrap();
    let mut spec = StagingSpec::new(
      "protoc-gen-lw-java",
      "1.2.0",
      temp.path().join("libs"),
      StageAlias {
        target: TargetId::new("launcher", "current"),
        name: "protoc-gen-lw-java".to_string(),
      },
    );
    for (classifier, triple) in CLASSIFIED {
      spec = spec.classifier(classifier, TargetId::new("launcher", triple));
    }
    (temp, plan, spec)
  }

  fn fake_build(plan: &BuildPlan) {
    for target in plan.targets() {
      std::fs::create_dir_all(&target.output_dir).unwrap();
      std::fs::write(&target.binary_path, target.id.to_string()).unwrap();
    }
  }

  #[test]
  fn file_names_follow_the_convention() {
    let (_temp, _plan, spec) = fixture();
    assert_eq!(spec.file_name("linux-x86_64"), "protoc-gen-lw-java-1.2.0-linux-x86_64.exe");
    assert_eq!(
      spec.clone().extension("").file_name("osx-x86_64"),
      "protoc-gen-lw-java-1.2.0-osx-x86_64"
    );
  }

  #[tokio::test]
  async fn three_classifiers_plus_alias_make_four_files() {
    let (temp, plan, spec) = fixture();
    fake_build(&plan);

    let staged = stage_artifacts(&spec, &plan).await.unwrap();

    assert_eq!(staged.len(), 4);
    let mut names: Vec<String> = std::fs::read_dir(temp.path().join("libs"))
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .collect();
    names.sort();
    assert_eq!(
      names,
      vec![
        "protoc-gen-lw-java",
        "protoc-gen-lw-java-1.2.0-linux-x86_64.exe",
        "protoc-gen-lw-java-1.2.0-osx-aarch_64.exe",
        "protoc-gen-lw-java-1.2.0-windows-x86_64.exe",
      ]
    );

    let windows =
      std::fs::read_to_string(temp.path().join("libs/protoc-gen-lw-java-1.2.0-windows-x86_64.exe")).unwrap();
    assert_eq!(windows, "launcher:x86_64-pc-windows-gnu");
    let alias = std::fs::read_to_string(temp.path().join("libs/protoc-gen-lw-java")).unwrap();
    assert_eq!(alias, "launcher:current");
  }

  #[tokio::test]
  async fn missing_source_is_a_contract_violation_and_copies_nothing() {
    let (temp, plan, spec) = fixture();
    fake_build(&plan);
    let darwin = plan
      .target(&TargetId::new("launcher", "aarch64-apple-darwin"))
      .unwrap()
      .binary_path
      .clone();
    std::fs::remove_file(&darwin).unwrap();

    let err = stage_artifacts(&spec, &plan).await.unwrap_err();

    match err {
      ExecuteError::Contract(ContractViolation::MissingStagingSource { classifier, path }) => {
        assert_eq!(classifier, "osx-aarch_64");
        assert_eq!(path, darwin);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert!(!temp.path().join("libs").exists());
  }

  #[test]
  fn unknown_staging_target_is_a_configuration_error() {
    let (_temp, plan, spec) = fixture();
    let spec = spec.classifier("linux-riscv64", TargetId::new("launcher", "riscv64gc-unknown-linux-gnu"));
    assert!(matches!(
      spec.validate(&plan),
      Err(ConfigError::UnknownStagingTarget { ref target }) if target == "launcher:riscv64gc-unknown-linux-gnu"
    ));
  }

  #[test]
  fn alias_from_a_cross_build_is_a_configuration_error() {
    let (_temp, plan, mut spec) = fixture();
    spec.alias.target = TargetId::new("launcher", "x86_64-pc-windows-gnu");
    match spec.validate(&plan) {
      Err(ConfigError::AliasNotHost { target, triple }) => {
        assert_eq!(target, "launcher:x86_64-pc-windows-gnu");
        assert_eq!(triple, "x86_64-pc-windows-gnu");
      }
      other => panic!("unexpected {other:?}"),
    }
    assert!(spec.copies(&plan).is_err());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failed_release_stages_nothing() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("launcher");
    std::fs::create_dir(&source).unwrap();

    let mut registry = Registry::new(temp.path().join("build"));
    registry.set_tool_chain(ToolChain::custom("/bin/false"));
    registry
      .new_project("launcher", |p| {
        p.source_dir(&source);
      })
      .unwrap()
      .new_target("current", |_| {})
      .unwrap();
    let spec = StagingSpec::new(
      "app",
      "0.1.0",
      temp.path().join("libs"),
      StageAlias {
        target: TargetId::new("launcher", "current"),
        name: "app".to_string(),
      },
    );

    let report = release(&registry, &spec, &ExecuteConfig::default()).await.unwrap();

    assert_eq!(report.run.build_failures().count(), 1);
    assert!(report.staged.is_empty());
    assert!(!temp.path().join("libs").exists());
  }

  #[test]
  fn targets_are_listed_once() {
    let (_temp, _plan, spec) = fixture();
    let spec = spec.classifier("host", TargetId::new("launcher", "current"));
    assert_eq!(spec.targets().len(), 4);
  }
}
