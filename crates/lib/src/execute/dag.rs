//! Execution DAG for target and step dependency management.
//!
//! This module provides a directed acyclic graph (DAG) over targets and
//! external steps, validates it once at plan time and computes parallel
//! execution waves.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use crate::error::ConfigError;
use crate::types::{NodeRef, TargetId};

/// A node in the execution DAG.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DagNode {
  /// A target to be built.
  Target(TargetId),
  /// An external step to be completed.
  Step(String),
}

impl fmt::Display for DagNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DagNode::Target(id) => write!(f, "{}", id),
      DagNode::Step(name) => write!(f, "step:{}", name),
    }
  }
}

/// A validated, acyclic dependency graph.
///
/// Edges point from a dependency to its dependent.
#[derive(Debug, Clone)]
pub struct ExecutionDag {
  graph: DiGraph<DagNode, ()>,
  indices: HashMap<DagNode, NodeIndex>,
}

impl ExecutionDag {
  /// Build and validate the graph.
  ///
  /// `nodes` pairs every node with its declared dependencies. A
  /// `NodeRef::Project` expands to every target of that project; `projects`
  /// lists the registered project names so an empty project is not mistaken
  /// for an unknown one.
  ///
  /// # Errors
  ///
  /// `UnknownDependency` for a reference to nothing registered, and
  /// `DependencyCycle` naming every node that sits on a cycle.
  pub fn build(nodes: Vec<(DagNode, Vec<NodeRef>)>, projects: &[String]) -> Result<Self, ConfigError> {
    let mut graph = DiGraph::new();
    let mut indices = HashMap::new();

    // First pass: create nodes
    for (node, _) in &nodes {
      let idx = graph.add_node(node.clone());
      indices.insert(node.clone(), idx);
    }

    let mut dag = Self { graph, indices };

    // Second pass: add edges from dependencies to dependents
    for (node, deps) in &nodes {
      let dependent = dag.indices[node];
      for dep in deps {
        for dep_idx in dag.expand(node, dep, projects)? {
          dag.graph.update_edge(dep_idx, dependent, ());
        }
      }
    }

    dag.verify_acyclic()?;

    Ok(dag)
  }

  fn expand(&self, from: &DagNode, dep: &NodeRef, projects: &[String]) -> Result<Vec<NodeIndex>, ConfigError> {
    let unknown = || ConfigError::UnknownDependency {
      from: from.to_string(),
      to: dep.to_string(),
    };

    match dep {
      NodeRef::Target(id) => self
        .indices
        .get(&DagNode::Target(id.clone()))
        .map(|&idx| vec![idx])
        .ok_or_else(unknown),
      NodeRef::Step(name) => self
        .indices
        .get(&DagNode::Step(name.clone()))
        .map(|&idx| vec![idx])
        .ok_or_else(unknown),
      NodeRef::Project(name) => {
        if !projects.contains(name) {
          return Err(unknown());
        }
        Ok(
          self
            .graph
            .node_indices()
            .filter(|&idx| matches!(&self.graph[idx], DagNode::Target(id) if &id.project == name))
            .collect(),
        )
      }
    }
  }

  /// Reject cycles, naming every node that participates in one.
  fn verify_acyclic(&self) -> Result<(), ConfigError> {
    let mut cyclic: BTreeSet<String> = BTreeSet::new();

    for component in tarjan_scc(&self.graph) {
      let self_loop = component.len() == 1 && self.graph.contains_edge(component[0], component[0]);
      if component.len() > 1 || self_loop {
        cyclic.extend(component.iter().map(|&idx| self.graph[idx].to_string()));
      }
    }

    if cyclic.is_empty() {
      Ok(())
    } else {
      Err(ConfigError::DependencyCycle {
        nodes: cyclic.into_iter().collect(),
      })
    }
  }

  /// Nodes organized into parallel execution waves.
  ///
  /// Each wave contains nodes whose dependencies are all in previous waves.
  /// Within a wave, nodes keep registration order.
  pub fn execution_waves(&self) -> Vec<Vec<DagNode>> {
    // Kahn's algorithm, level by level
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let (ready, rest): (Vec<NodeIndex>, Vec<NodeIndex>) = remaining.into_iter().partition(|idx| in_degree[idx] == 0);

      // Unreachable for a validated graph.
      if ready.is_empty() {
        break;
      }

      for &idx in &ready {
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
      remaining = rest;
    }

    waves
  }

  /// Direct dependencies of a node.
  pub fn dependencies(&self, node: &DagNode) -> Vec<DagNode> {
    let Some(&idx) = self.indices.get(node) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect()
  }

  /// Nodes that depend on `node` directly.
  pub fn direct_dependents(&self, node: &DagNode) -> Vec<DagNode> {
    let Some(&idx) = self.indices.get(node) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|dependent| self.graph[dependent].clone())
      .collect()
  }

  /// The given roots plus everything they transitively depend on.
  pub fn with_prerequisites<'a>(&self, roots: impl IntoIterator<Item = &'a DagNode>) -> HashSet<DagNode> {
    let reversed = Reversed(&self.graph);
    let mut closure = HashSet::new();

    for root in roots {
      let Some(&start) = self.indices.get(root) else {
        continue;
      };
      let mut dfs = Dfs::new(reversed, start);
      while let Some(idx) = dfs.next(reversed) {
        closure.insert(self.graph[idx].clone());
      }
    }

    closure
  }

  /// Everything that transitively depends on `node`, excluding `node`.
  pub fn dependents(&self, node: &DagNode) -> HashSet<DagNode> {
    let Some(&start) = self.indices.get(node) else {
      return HashSet::new();
    };

    let mut dfs = Dfs::new(&self.graph, start);
    let mut dependents = HashSet::new();
    while let Some(idx) = dfs.next(&self.graph) {
      if idx != start {
        dependents.insert(self.graph[idx].clone());
      }
    }
    dependents
  }

  pub fn contains(&self, node: &DagNode) -> bool {
    self.indices.contains_key(node)
  }

  /// Number of nodes in the DAG.
  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  /// Every node, in registration order.
  pub fn nodes(&self) -> impl Iterator<Item = &DagNode> {
    self.graph.node_indices().map(|idx| &self.graph[idx])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target(project: &str, name: &str) -> DagNode {
    DagNode::Target(TargetId::new(project, name))
  }

  fn step(name: &str) -> DagNode {
    DagNode::Step(name.to_string())
  }

  fn projects(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn empty_graph() {
    let dag = ExecutionDag::build(vec![], &[]).unwrap();
    assert_eq!(dag.node_count(), 0);
    assert!(dag.execution_waves().is_empty());
  }

  #[test]
  fn step_runs_before_targets_that_need_it() {
    let dag = ExecutionDag::build(
      vec![
        (target("native", "current"), vec![NodeRef::step("copy-jar")]),
        (target("native", "x86_64-pc-windows-gnu"), vec![NodeRef::step("copy-jar")]),
        (step("copy-jar"), vec![]),
      ],
      &projects(&["native"]),
    )
    .unwrap();

    let waves = dag.execution_waves();
    assert_eq!(waves.len(), 2);
    assert_eq!(waves[0], vec![step("copy-jar")]);
    assert_eq!(
      waves[1],
      vec![target("native", "current"), target("native", "x86_64-pc-windows-gnu")]
    );
    assert_eq!(dag.dependencies(&target("native", "current")), vec![step("copy-jar")]);
  }

  #[test]
  fn diamond_dependency() {
    // a <- b, a <- c, {b, c} <- d
    let dag = ExecutionDag::build(
      vec![
        (target("p", "d"), vec![NodeRef::target("p", "b"), NodeRef::target("p", "c")]),
        (target("p", "b"), vec![NodeRef::target("p", "a")]),
        (target("p", "c"), vec![NodeRef::target("p", "a")]),
        (target("p", "a"), vec![]),
      ],
      &projects(&["p"]),
    )
    .unwrap();

    let waves = dag.execution_waves();
    assert_eq!(waves.len(), 3);
    assert_eq!(waves[0], vec![target("p", "a")]);
    assert_eq!(waves[1].len(), 2);
    assert_eq!(waves[2], vec![target("p", "d")]);

    let dependents = dag.dependents(&target("p", "b"));
    assert_eq!(dependents, HashSet::from([target("p", "d")]));

    let direct: HashSet<DagNode> = dag.direct_dependents(&target("p", "a")).into_iter().collect();
    assert_eq!(direct, HashSet::from([target("p", "b"), target("p", "c")]));
  }

  #[test]
  fn project_reference_expands_to_all_its_targets() {
    let dag = ExecutionDag::build(
      vec![
        (target("lib", "current"), vec![]),
        (target("lib", "aarch64-apple-darwin"), vec![]),
        (step("package"), vec![NodeRef::project("lib")]),
      ],
      &projects(&["lib"]),
    )
    .unwrap();

    let mut deps = dag.dependencies(&step("package"));
    deps.sort();
    assert_eq!(deps, vec![target("lib", "aarch64-apple-darwin"), target("lib", "current")]);
  }

  #[test]
  fn two_node_cycle_names_both() {
    let err = ExecutionDag::build(
      vec![
        (target("p", "a"), vec![NodeRef::target("p", "b")]),
        (target("p", "b"), vec![NodeRef::target("p", "a")]),
        (target("p", "c"), vec![]),
      ],
      &projects(&["p"]),
    )
    .unwrap_err();

    match err {
      ConfigError::DependencyCycle { nodes } => assert_eq!(nodes, vec!["p:a", "p:b"]),
      other => panic!("expected cycle, got {other:?}"),
    }
  }

  #[test]
  fn self_dependency_is_a_cycle() {
    let err = ExecutionDag::build(vec![(step("loop"), vec![NodeRef::step("loop")])], &[]).unwrap_err();
    assert!(err.to_string().contains("step:loop"));
  }

  #[test]
  fn cross_project_cycle_through_step() {
    let err = ExecutionDag::build(
      vec![
        (target("a", "current"), vec![NodeRef::step("glue")]),
        (step("glue"), vec![NodeRef::project("b")]),
        (target("b", "current"), vec![NodeRef::target("a", "current")]),
      ],
      &projects(&["a", "b"]),
    )
    .unwrap_err();

    match err {
      ConfigError::DependencyCycle { nodes } => {
        assert_eq!(nodes, vec!["a:current", "b:current", "step:glue"]);
      }
      other => panic!("expected cycle, got {other:?}"),
    }
  }

  #[test]
  fn unknown_references_are_rejected() {
    for dep in [NodeRef::step("missing"), NodeRef::target("p", "missing"), NodeRef::project("nope")] {
      let err = ExecutionDag::build(vec![(target("p", "a"), vec![dep.clone()])], &projects(&["p"])).unwrap_err();
      assert!(
        matches!(err, ConfigError::UnknownDependency { ref from, ref to } if from == "p:a" && *to == dep.to_string()),
        "{:?}",
        err
      );
    }
  }

  #[test]
  fn empty_project_reference_is_allowed() {
    let dag = ExecutionDag::build(vec![(step("s"), vec![NodeRef::project("empty")])], &projects(&["empty"])).unwrap();
    assert!(dag.dependencies(&step("s")).is_empty());
  }

  #[test]
  fn prerequisites_closure() {
    let dag = ExecutionDag::build(
      vec![
        (step("bundle"), vec![]),
        (target("a", "current"), vec![NodeRef::step("bundle")]),
        (target("b", "current"), vec![]),
      ],
      &projects(&["a", "b"]),
    )
    .unwrap();

    let closure = dag.with_prerequisites([&target("a", "current")]);
    assert_eq!(closure, HashSet::from([target("a", "current"), step("bundle")]));
  }
}
