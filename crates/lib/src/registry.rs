//! The explicit registration API: projects, their targets, and external steps.
//!
//! Creation and configuration are one synchronous call. Nothing is resolved
//! until [`Registry::plan`], which is the single point where defaults are
//! applied, tool chains are located and the dependency graph is validated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::env::EnvScope;
use crate::error::ConfigError;
use crate::execute::dag::{DagNode, ExecutionDag};
use crate::plan::BuildPlan;
use crate::project::Project;
use crate::step::{Step, StepAction};
use crate::target::{ResolvedTarget, Target};
use crate::toolchain::{self, ResolvedToolChain, ToolChain};
use crate::types::TargetId;

#[derive(Debug)]
pub struct Registry {
  build_dir: PathBuf,
  tool_chain: ToolChain,
  env: EnvScope,
  projects: IndexMap<String, Project>,
  steps: IndexMap<String, Step>,
}

impl Registry {
  /// `build_dir` hosts default destination roots.
  pub fn new(build_dir: impl Into<PathBuf>) -> Self {
    Self {
      build_dir: build_dir.into(),
      tool_chain: ToolChain::Default,
      env: EnvScope::new(),
      projects: IndexMap::new(),
      steps: IndexMap::new(),
    }
  }

  pub fn build_dir(&self) -> &Path {
    &self.build_dir
  }

  /// Tool chain for projects that don't pick one.
  pub fn set_tool_chain(&mut self, tool_chain: ToolChain) {
    self.tool_chain = tool_chain;
  }

  /// Root environment scope. Every project scope extends it.
  pub fn env(&self) -> &EnvScope {
    &self.env
  }

  /// Register a project and configure it immediately.
  pub fn new_project(&mut self, name: &str, configure: impl FnOnce(&mut Project)) -> Result<&mut Project, ConfigError> {
    if self.projects.contains_key(name) {
      return Err(ConfigError::DuplicateProject(name.to_string()));
    }

    let env = EnvScope::new();
    env.extends_from(&self.env)?;

    let mut project = Project::new(name.to_string(), env);
    configure(&mut project);

    debug!(project = %name, "registered project");
    Ok(self.projects.entry(name.to_string()).or_insert(project))
  }

  /// Register a target on an already registered project.
  pub fn new_target(
    &mut self,
    project: &str,
    name: &str,
    configure: impl FnOnce(&mut Target),
  ) -> Result<&mut Target, ConfigError> {
    self
      .projects
      .get_mut(project)
      .ok_or_else(|| ConfigError::UnknownProject(project.to_string()))?
      .new_target(name, configure)
  }

  /// Register an external prerequisite step.
  pub fn new_step(
    &mut self,
    name: &str,
    action: StepAction,
    configure: impl FnOnce(&mut Step),
  ) -> Result<&mut Step, ConfigError> {
    if self.steps.contains_key(name) {
      return Err(ConfigError::DuplicateStep(name.to_string()));
    }

    let mut step = Step::new(name.to_string(), action);
    configure(&mut step);

    debug!(step = %name, "registered step");
    Ok(self.steps.entry(name.to_string()).or_insert(step))
  }

  pub fn project(&self, name: &str) -> Option<&Project> {
    self.projects.get(name)
  }

  pub fn project_mut(&mut self, name: &str) -> Option<&mut Project> {
    self.projects.get_mut(name)
  }

  pub fn projects(&self) -> impl Iterator<Item = &Project> {
    self.projects.values()
  }

  pub fn steps(&self) -> impl Iterator<Item = &Step> {
    self.steps.values()
  }

  /// Resolve every target and validate the dependency graph.
  ///
  /// Each distinct tool chain selector is resolved at most once. Fails on the
  /// first configuration error; nothing has run at that point.
  pub fn plan(&self) -> Result<BuildPlan, ConfigError> {
    let mut resolved_chains: HashMap<ToolChain, ResolvedToolChain> = HashMap::new();
    let mut resolve_tool_chain = |selector: &ToolChain| -> Result<ResolvedToolChain, ConfigError> {
      if let Some(resolved) = resolved_chains.get(selector) {
        return Ok(resolved.clone());
      }
      let resolved = toolchain::resolve(selector)?;
      resolved_chains.insert(selector.clone(), resolved.clone());
      Ok(resolved)
    };

    let mut targets: IndexMap<TargetId, ResolvedTarget> = IndexMap::new();

    for project in self.projects.values() {
      let defaults = project.defaults(&self.build_dir, &self.tool_chain)?;
      let mut outputs: HashMap<PathBuf, TargetId> = HashMap::new();

      for target in project.targets() {
        let resolved = ResolvedTarget::resolve(project.name(), target, &defaults, &mut resolve_tool_chain)?;

        if let Some(first) = outputs.insert(resolved.binary_path.clone(), resolved.id.clone()) {
          return Err(ConfigError::OutputCollision {
            first: first.to_string(),
            second: resolved.id.to_string(),
            path: resolved.binary_path,
          });
        }

        targets.insert(resolved.id.clone(), resolved);
      }
    }

    let nodes = targets
      .values()
      .map(|t| (DagNode::Target(t.id.clone()), t.depends_on.clone()))
      .chain(
        self
          .steps
          .values()
          .map(|s| (DagNode::Step(s.name().to_string()), s.depends_on.clone())),
      )
      .collect();
    let project_names: Vec<String> = self.projects.keys().cloned().collect();
    let dag = ExecutionDag::build(nodes, &project_names)?;

    info!(targets = targets.len(), steps = self.steps.len(), "build plan ready");

    Ok(BuildPlan::new(targets, self.steps.clone(), dag))
  }
}
