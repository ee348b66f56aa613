//! Subprocess invocation.
//!
//! Children inherit the host environment, then the resolved environment is
//! applied on top: set variables override, unset variables are removed.
//! Output is captured in full.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::env::ResolvedEnvironment;
use crate::execute::types::ExecuteError;

/// One program run.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub program: PathBuf,
  pub args: Vec<OsString>,
  pub cwd: Option<PathBuf>,
  pub env: ResolvedEnvironment,
  /// The child is killed when this elapses.
  pub timeout: Option<Duration>,
}

impl Invocation {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: ResolvedEnvironment::default(),
      timeout: None,
    }
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn env(mut self, env: ResolvedEnvironment) -> Self {
    self.env = env;
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// Program and arguments, space separated.
  pub fn display(&self) -> String {
    std::iter::once(self.program.as_os_str())
      .chain(self.args.iter().map(OsString::as_os_str))
      .map(|a| a.to_string_lossy())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// What a finished (or killed) child left behind.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
  pub success: bool,
  /// `None` when killed by a signal or by the deadline.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub timed_out: bool,
}

/// Run a program to completion.
///
/// A non-zero exit is not an error here; callers decide what it means. Only a
/// failure to start the process is.
pub async fn run_command(invocation: &Invocation) -> Result<ProcessOutput, ExecuteError> {
  let mut command = Command::new(&invocation.program);
  command
    .args(&invocation.args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  if let Some(cwd) = &invocation.cwd {
    command.current_dir(cwd);
  }
  for (key, value) in &invocation.env.vars {
    command.env(key, value);
  }
  for key in &invocation.env.unset {
    command.env_remove(key);
  }

  debug!(
    command = %invocation.display(),
    cwd = ?invocation.cwd,
    timeout = ?invocation.timeout,
    "spawning process"
  );

  let child = command.spawn().map_err(|source| ExecuteError::Spawn {
    program: invocation.program.display().to_string(),
    source,
  })?;

  let output = match invocation.timeout {
    Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
      Ok(output) => output?,
      Err(_) => {
        // Dropping the pending wait drops the child, which kills it.
        debug!(command = %invocation.display(), ?limit, "process timed out");
        return Ok(ProcessOutput {
          timed_out: true,
          ..ProcessOutput::default()
        });
      }
    },
    None => child.wait_with_output().await?,
  };

  let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if !output.status.success() {
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
  }

  Ok(ProcessOutput {
    success: output.status.success(),
    code: output.status.code(),
    stdout,
    stderr,
    timed_out: false,
  })
}
