//! External prerequisite steps.
//!
//! A step is an opaque handle the engine waits on before running the targets
//! that depend on it, such as packaging a resource bundle into a project's
//! source tree. The engine runs it but never inspects what it produced.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::types::NodeRef;

pub type StepCallback = Arc<dyn Fn() -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

#[derive(Clone)]
pub enum StepAction {
  /// Completed by the caller before the run; nothing to do.
  Completed,
  /// Run an external program.
  Command {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
  },
  /// Run a blocking function on the worker pool.
  Callback(StepCallback),
}

impl StepAction {
  pub fn command<I, S>(program: impl Into<PathBuf>, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    StepAction::Command {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
      cwd: None,
    }
  }

  pub fn callback<F>(f: F) -> Self
  where
    F: Fn() -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync + 'static,
  {
    StepAction::Callback(Arc::new(f))
  }
}

impl fmt::Debug for StepAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepAction::Completed => write!(f, "Completed"),
      StepAction::Command { program, args, cwd } => f
        .debug_struct("Command")
        .field("program", program)
        .field("args", args)
        .field("cwd", cwd)
        .finish(),
      StepAction::Callback(_) => write!(f, "Callback(..)"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Step {
  name: String,
  pub action: StepAction,
  pub depends_on: Vec<NodeRef>,
}

impl Step {
  pub(crate) fn new(name: String, action: StepAction) -> Self {
    Self {
      name,
      action,
      depends_on: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn depends_on(&mut self, node: impl Into<NodeRef>) -> &mut Self {
    self.depends_on.push(node.into());
    self
  }
}
