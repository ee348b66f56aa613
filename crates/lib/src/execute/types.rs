//! Types for build execution.
//!
//! This module defines the failure taxonomy, the per-run report and the
//! execution configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::error::ConfigError;
use crate::execute::dag::DagNode;
use crate::types::TargetId;
use crate::util::hash::DirHashError;

/// A tool chain run that exited with success but broke its promise.
#[derive(Debug, Error)]
pub enum ContractViolation {
  #[error("{target} reported success but {} does not exist", .path.display())]
  MissingBinary { target: TargetId, path: PathBuf },

  #[error("staging source for classifier {classifier} does not exist: {}", .path.display())]
  MissingStagingSource { classifier: String, path: PathBuf },
}

/// Errors that can occur while running a plan.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The tool chain exited unsuccessfully or ran out of time.
  #[error("{}", describe_build_failure(.target, .code, .timed_out, .stderr))]
  BuildFailed {
    target: TargetId,
    command: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
    timed_out: bool,
  },

  #[error(transparent)]
  Contract(#[from] ContractViolation),

  #[error("step {step} failed: {message}")]
  StepFailed { step: String, message: String },

  /// The process couldn't be started at all.
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("task for {0} panicked")]
  Panicked(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to hash build inputs: {0}")]
  Hash(#[from] DirHashError),

  #[error(transparent)]
  Config(#[from] ConfigError),
}

fn describe_build_failure(target: &TargetId, code: &Option<i32>, timed_out: &bool, stderr: &str) -> String {
  let mut message = if *timed_out {
    format!("build of {target} timed out")
  } else {
    match code {
      Some(code) => format!("build of {target} failed with exit code {code}"),
      None => format!("build of {target} was terminated by a signal"),
    }
  };
  let tail = stderr.trim();
  if !tail.is_empty() {
    message.push_str(":\n");
    message.push_str(tail);
  }
  message
}

impl ExecuteError {
  pub fn is_build_failure(&self) -> bool {
    matches!(self, ExecuteError::BuildFailed { .. })
  }

  pub fn is_contract_violation(&self) -> bool {
    matches!(self, ExecuteError::Contract(_))
  }
}

/// What happened to one target that didn't fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
  Built { binary: PathBuf },
  UpToDate { binary: PathBuf },
}

/// Result of running a plan.
///
/// Every node that was part of the run lands in exactly one bucket.
#[derive(Debug, Default)]
pub struct RunReport {
  /// Targets whose tool chain ran, with the verified binary path.
  pub built: BTreeMap<TargetId, PathBuf>,
  /// Targets skipped by the staleness check.
  pub up_to_date: BTreeMap<TargetId, PathBuf>,
  pub steps_completed: BTreeSet<String>,
  pub failed: BTreeMap<DagNode, ExecuteError>,
  /// Nodes not run because a dependency failed; maps to that dependency.
  pub skipped: BTreeMap<DagNode, DagNode>,
  /// Nodes not started because the run stopped early.
  pub cancelled: BTreeSet<DagNode>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty() && self.cancelled.is_empty()
  }

  pub(crate) fn record_target(&mut self, id: TargetId, outcome: TargetOutcome) {
    match outcome {
      TargetOutcome::Built { binary } => {
        self.built.insert(id, binary);
      }
      TargetOutcome::UpToDate { binary } => {
        self.up_to_date.insert(id, binary);
      }
    }
  }

  /// Path of a target's binary, if it is available after this run.
  pub fn binary(&self, id: &TargetId) -> Option<&PathBuf> {
    self.built.get(id).or_else(|| self.up_to_date.get(id))
  }

  pub fn build_failures(&self) -> impl Iterator<Item = (&DagNode, &ExecuteError)> {
    self.failed.iter().filter(|(_, e)| e.is_build_failure())
  }

  pub fn contract_violations(&self) -> impl Iterator<Item = (&DagNode, &ExecuteError)> {
    self.failed.iter().filter(|(_, e)| e.is_contract_violation())
  }

  pub fn total(&self) -> usize {
    self.built.len()
      + self.up_to_date.len()
      + self.steps_completed.len()
      + self.failed.len()
      + self.skipped.len()
      + self.cancelled.len()
  }
}

/// Configuration for plan execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of nodes running at once.
  pub parallelism: usize,

  /// Stop starting new work after the first failure.
  pub fail_fast: bool,

  /// Ignore fingerprint records and rebuild everything.
  pub force: bool,

  /// Deadline for a single tool chain invocation.
  pub timeout: Option<Duration>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      fail_fast: false,
      force: false,
      timeout: None,
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn failure(code: Option<i32>, timed_out: bool) -> ExecuteError {
    ExecuteError::BuildFailed {
      target: TargetId::new("native", "current"),
      command: "cargo build".to_string(),
      code,
      stdout: String::new(),
      stderr: "error[E0425]: cannot find value `x`\n".to_string(),
      timed_out,
    }
  }

  #[test]
  fn empty_report_is_success() {
    let report = RunReport::default();
    assert!(report.is_success());
    assert_eq!(report.total(), 0);
  }

  #[test]
  fn up_to_date_targets_still_count_as_success() {
    let mut report = RunReport::default();
    let id = TargetId::new("native", "current");
    report.record_target(id.clone(), TargetOutcome::UpToDate { binary: "/out/app".into() });
    assert!(report.is_success());
    assert_eq!(report.binary(&id), Some(&PathBuf::from("/out/app")));
    assert!(report.built.is_empty());
  }

  #[test]
  fn failures_are_told_apart() {
    let mut report = RunReport::default();
    let a = DagNode::Target(TargetId::new("native", "a"));
    let b = DagNode::Target(TargetId::new("native", "b"));
    report.failed.insert(a.clone(), failure(Some(101), false));
    report.failed.insert(
      b.clone(),
      ContractViolation::MissingBinary {
        target: TargetId::new("native", "b"),
        path: "/out/b".into(),
      }
      .into(),
    );

    assert!(!report.is_success());
    assert_eq!(report.build_failures().map(|(n, _)| n).collect::<Vec<_>>(), vec![&a]);
    assert_eq!(report.contract_violations().map(|(n, _)| n).collect::<Vec<_>>(), vec![&b]);
  }

  #[test]
  fn skipped_and_cancelled_are_not_success() {
    let mut report = RunReport::default();
    report.cancelled.insert(DagNode::Step("copy-jar".to_string()));
    assert!(!report.is_success());

    let mut report = RunReport::default();
    report.skipped.insert(
      DagNode::Target(TargetId::new("native", "b")),
      DagNode::Target(TargetId::new("native", "a")),
    );
    assert!(!report.is_success());
    assert_eq!(report.total(), 1);
  }

  #[test]
  fn build_failure_message_includes_stderr() {
    let message = failure(Some(101), false).to_string();
    assert!(message.starts_with("build of native:current failed with exit code 101"));
    assert!(message.contains("cannot find value"));

    assert!(failure(None, true).to_string().contains("timed out"));
    assert!(failure(None, false).to_string().contains("signal"));
  }

  #[test]
  fn execute_config_defaults() {
    let config = ExecuteConfig::default();
    assert!(config.parallelism >= 1);
    assert!(!config.fail_fast);
    assert!(!config.force);
    assert!(config.timeout.is_none());
  }
}
