use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const STEP_PREFIX: &str = "step:";

/// Identifies one target of one project, written `project:target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId {
  pub project: String,
  pub target: String,
}

impl TargetId {
  pub fn new(project: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      target: target.into(),
    }
  }
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.project, self.target)
  }
}

/// A dependency handle as written in configuration.
///
/// - `step:<name>` is an external step
/// - `<project>:<target>` is one target
/// - `<project>` is every target of a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeRef {
  Target(TargetId),
  Project(String),
  Step(String),
}

impl NodeRef {
  pub fn target(project: impl Into<String>, target: impl Into<String>) -> Self {
    Self::Target(TargetId::new(project, target))
  }

  pub fn project(name: impl Into<String>) -> Self {
    Self::Project(name.into())
  }

  pub fn step(name: impl Into<String>) -> Self {
    Self::Step(name.into())
  }
}

impl fmt::Display for NodeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeRef::Target(id) => write!(f, "{}", id),
      NodeRef::Project(name) => write!(f, "{}", name),
      NodeRef::Step(name) => write!(f, "{}{}", STEP_PREFIX, name),
    }
  }
}

impl FromStr for NodeRef {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ConfigError::InvalidReference(s.to_string());

    if let Some(step) = s.strip_prefix(STEP_PREFIX) {
      if step.is_empty() {
        return Err(invalid());
      }
      return Ok(NodeRef::step(step));
    }

    match s.split_once(':') {
      Some((project, target)) if !project.is_empty() && !target.is_empty() && !target.contains(':') => {
        Ok(NodeRef::target(project, target))
      }
      Some(_) => Err(invalid()),
      None if !s.is_empty() => Ok(NodeRef::project(s)),
      None => Err(invalid()),
    }
  }
}

impl TryFrom<String> for NodeRef {
  type Error = ConfigError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<NodeRef> for String {
  fn from(value: NodeRef) -> Self {
    value.to_string()
  }
}

impl From<TargetId> for NodeRef {
  fn from(value: TargetId) -> Self {
    NodeRef::Target(value)
  }
}
