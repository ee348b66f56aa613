//! The immutable result of [`crate::Registry::plan`].

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::ConfigError;
use crate::execute::dag::{DagNode, ExecutionDag};
use crate::step::Step;
use crate::target::ResolvedTarget;
use crate::types::{NodeRef, TargetId};

/// Every target resolved, every step registered, and a validated graph.
#[derive(Debug, Clone)]
pub struct BuildPlan {
  targets: IndexMap<TargetId, ResolvedTarget>,
  steps: IndexMap<String, Step>,
  dag: ExecutionDag,
}

impl BuildPlan {
  pub(crate) fn new(
    targets: IndexMap<TargetId, ResolvedTarget>,
    steps: IndexMap<String, Step>,
    dag: ExecutionDag,
  ) -> Self {
    Self { targets, steps, dag }
  }

  pub fn target(&self, id: &TargetId) -> Option<&ResolvedTarget> {
    self.targets.get(id)
  }

  /// Targets in registration order.
  pub fn targets(&self) -> impl Iterator<Item = &ResolvedTarget> {
    self.targets.values()
  }

  pub fn step(&self, name: &str) -> Option<&Step> {
    self.steps.get(name)
  }

  pub fn steps(&self) -> impl Iterator<Item = &Step> {
    self.steps.values()
  }

  pub fn dag(&self) -> &ExecutionDag {
    &self.dag
  }

  /// The requested nodes and everything they transitively need.
  ///
  /// A project reference selects all of its targets.
  pub fn closure(&self, roots: &[NodeRef]) -> Result<HashSet<DagNode>, ConfigError> {
    let mut start = Vec::new();
    for root in roots {
      match root {
        NodeRef::Target(id) if self.targets.contains_key(id) => start.push(DagNode::Target(id.clone())),
        NodeRef::Step(name) if self.steps.contains_key(name) => start.push(DagNode::Step(name.clone())),
        NodeRef::Project(name) if self.targets.keys().any(|id| &id.project == name) => start.extend(
          self
            .targets
            .keys()
            .filter(|id| &id.project == name)
            .map(|id| DagNode::Target(id.clone())),
        ),
        other => return Err(ConfigError::InvalidReference(other.to_string())),
      }
    }
    Ok(self.dag.with_prerequisites(&start))
  }
}
