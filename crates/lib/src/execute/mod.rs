//! Build execution.
//!
//! This module runs a [`BuildPlan`]:
//! - DAG-based dependency ordering, starting each node once its
//!   prerequisites are done
//! - Parallel execution of independent nodes, bounded by a semaphore
//! - Staleness skipping through fingerprint records
//! - Failure propagation and skip tracking

pub mod command;
pub mod dag;
pub mod fingerprint;
pub mod types;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::plan::BuildPlan;
use crate::registry::Registry;
use crate::step::{Step, StepAction};
use crate::target::ResolvedTarget;

use command::{Invocation, run_command};
use fingerprint::FingerprintRecord;

pub use dag::{DagNode, ExecutionDag};
pub use types::{ContractViolation, ExecuteConfig, ExecuteError, RunReport, TargetOutcome};

/// Finalize the registry and run everything in it.
///
/// Configuration errors surface before anything runs.
pub async fn run(registry: &Registry, config: &ExecuteConfig) -> Result<RunReport, ExecuteError> {
  let plan = registry.plan()?;
  Ok(execute(&plan, config).await)
}

/// Run every node of a plan.
pub async fn execute(plan: &BuildPlan, config: &ExecuteConfig) -> RunReport {
  execute_nodes(plan, None, config).await
}

/// Run a plan, restricted to `selection` when given.
///
/// Each node starts as soon as its last prerequisite finishes; there is no
/// barrier between layers of the graph. The selection should be closed under
/// prerequisites (see [`BuildPlan::closure`]); a selected node whose
/// prerequisite was left out runs as if that prerequisite had succeeded.
pub async fn execute_nodes(
  plan: &BuildPlan,
  selection: Option<&HashSet<DagNode>>,
  config: &ExecuteConfig,
) -> RunReport {
  let dag = plan.dag();
  let selected = |node: &DagNode| selection.is_none_or(|s| s.contains(node));

  // Unfinished prerequisites of every node that hasn't started yet.
  let mut pending: HashMap<DagNode, usize> = dag
    .nodes()
    .filter(|node| selected(*node))
    .map(|node| {
      let count = dag.dependencies(node).iter().filter(|dep| selected(*dep)).count();
      (node.clone(), count)
    })
    .collect();
  let mut ready: VecDeque<DagNode> = dag
    .nodes()
    .filter(|node| pending.get(*node) == Some(&0))
    .cloned()
    .collect();

  info!(nodes = pending.len(), parallelism = config.parallelism, "starting execution");

  let mut report = RunReport::default();
  let mut failed: HashSet<DagNode> = HashSet::new();
  let mut stopped = false;

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set = JoinSet::new();
  let mut running: HashMap<tokio::task::Id, DagNode> = HashMap::new();

  loop {
    while !stopped {
      let Some(node) = ready.pop_front() else {
        break;
      };
      pending.remove(&node);

      if let Some(cause) = find_failed_dependency(&node, dag, &failed, &report) {
        warn!(node = %node, failed_dep = %cause, "skipping due to failed dependency");
        release(&node, dag, &mut pending, &mut ready);
        failed.insert(node.clone());
        report.skipped.insert(node, cause);
        continue;
      }

      let work = match &node {
        DagNode::Target(id) => plan.target(id).cloned().map(Work::Target),
        DagNode::Step(name) => plan.step(name).cloned().map(Work::Step),
      };
      let Some(work) = work else {
        // The plan's graph and maps are built together; this is unreachable.
        error!(node = %node, "node missing from plan");
        continue;
      };

      debug!(node = %node, "ready");
      let config = config.clone();
      let semaphore = semaphore.clone();
      let handle = join_set.spawn(async move {
        // The semaphore is never closed, so acquiring can't fail.
        let _permit = semaphore.acquire_owned().await.ok();
        match work {
          Work::Target(target) => realize_target(&target, &config).await.map(NodeOutcome::Target),
          Work::Step(step) => run_step(&step, &config).await.map(|()| NodeOutcome::Step),
        }
      });
      running.insert(handle.id(), node);
    }

    let Some(joined) = join_set.join_next_with_id().await else {
      break;
    };
    let (node, result) = match joined {
      Ok((id, result)) => match running.remove(&id) {
        Some(node) => (node, result),
        None => continue,
      },
      Err(e) => match running.remove(&e.id()) {
        Some(node) => {
          error!(node = %node, error = %e, "task panicked");
          let name = node.to_string();
          (node, Err(ExecuteError::Panicked(name)))
        }
        None => continue,
      },
    };

    release(&node, dag, &mut pending, &mut ready);
    match result {
      Ok(NodeOutcome::Target(outcome)) => {
        if let DagNode::Target(id) = &node {
          report.record_target(id.clone(), outcome);
        }
      }
      Ok(NodeOutcome::Step) => {
        if let DagNode::Step(name) = &node {
          report.steps_completed.insert(name.clone());
        }
      }
      Err(e) => {
        error!(node = %node, error = %e, "node failed");
        failed.insert(node.clone());
        report.failed.insert(node, e);
        if config.fail_fast {
          stopped = true;
        }
      }
    }
  }

  // Only a fail-fast stop leaves nodes behind.
  for node in pending.into_keys() {
    debug!(node = %node, "cancelled");
    report.cancelled.insert(node);
  }

  info!(
    built = report.built.len(),
    up_to_date = report.up_to_date.len(),
    steps = report.steps_completed.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    cancelled = report.cancelled.len(),
    "execution complete"
  );

  report
}

/// Count `node` as finished for its dependents, queueing those with nothing
/// left to wait for.
fn release(
  node: &DagNode,
  dag: &ExecutionDag,
  pending: &mut HashMap<DagNode, usize>,
  ready: &mut VecDeque<DagNode>,
) {
  for dependent in dag.direct_dependents(node) {
    if let Some(count) = pending.get_mut(&dependent)
      && *count > 0
    {
      *count -= 1;
      if *count == 0 {
        ready.push_back(dependent);
      }
    }
  }
}

/// The failed node that blocks `node`, following skips back to their cause.
fn find_failed_dependency(
  node: &DagNode,
  dag: &ExecutionDag,
  failed: &HashSet<DagNode>,
  report: &RunReport,
) -> Option<DagNode> {
  dag
    .dependencies(node)
    .into_iter()
    .find(|dep| failed.contains(dep))
    .map(|dep| report.skipped.get(&dep).cloned().unwrap_or(dep))
}

enum NodeOutcome {
  Target(TargetOutcome),
  Step,
}

enum Work {
  Target(ResolvedTarget),
  Step(Step),
}

/// Build one target unless its recorded fingerprint is still current.
pub async fn realize_target(target: &ResolvedTarget, config: &ExecuteConfig) -> Result<TargetOutcome, ExecuteError> {
  let state_file = target.state_file();

  if !config.force {
    let fingerprint = fingerprint::compute_blocking(target).await?;
    if fingerprint::is_up_to_date(target, &fingerprint).await {
      info!(target = %target.id, "up to date");
      return Ok(TargetOutcome::UpToDate {
        binary: target.binary_path.clone(),
      });
    }
  }

  // A failed or interrupted build must never look current.
  fingerprint::remove_record(&state_file).await?;
  tokio::fs::create_dir_all(&target.destination_root).await?;

  let invocation = Invocation::new(&target.tool_chain.executable)
    .args(target.args())
    .cwd(&target.source_dir)
    .env(target.environment.clone())
    .timeout(config.timeout);

  info!(target = %target.id, command = %invocation.display(), "building");
  let started = Instant::now();
  let output = run_command(&invocation).await?;

  if output.timed_out || !output.success {
    return Err(ExecuteError::BuildFailed {
      target: target.id.clone(),
      command: invocation.display(),
      code: output.code,
      stdout: output.stdout,
      stderr: output.stderr,
      timed_out: output.timed_out,
    });
  }

  if !target.binary_path.is_file() {
    return Err(
      ContractViolation::MissingBinary {
        target: target.id.clone(),
        path: target.binary_path.clone(),
      }
      .into(),
    );
  }

  // Fingerprint after the build, so files the tool chain writes into the
  // source tree (a fresh lock file) don't trigger another build next time.
  let fingerprint = fingerprint::compute_blocking(target).await?;
  fingerprint::write_record(
    &state_file,
    &FingerprintRecord {
      version: fingerprint::RECORD_VERSION,
      fingerprint: fingerprint.0,
      binary: target.binary_path.clone(),
    },
  )
  .await?;

  info!(target = %target.id, elapsed = ?started.elapsed(), "built");
  Ok(TargetOutcome::Built {
    binary: target.binary_path.clone(),
  })
}

/// Complete an external step.
pub async fn run_step(step: &Step, config: &ExecuteConfig) -> Result<(), ExecuteError> {
  let failed = |message: String| ExecuteError::StepFailed {
    step: step.name().to_string(),
    message,
  };

  match &step.action {
    StepAction::Completed => {
      debug!(step = %step.name(), "already complete");
    }
    StepAction::Command { program, args, cwd } => {
      let mut invocation = Invocation::new(program).args(args).timeout(config.timeout);
      if let Some(cwd) = cwd {
        invocation = invocation.cwd(cwd);
      }
      info!(step = %step.name(), command = %invocation.display(), "running step");

      let output = run_command(&invocation).await?;
      if output.timed_out {
        return Err(failed("timed out".to_string()));
      }
      if !output.success {
        let code = output.code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        return Err(failed(format!("exit status {code}: {}", output.stderr.trim())));
      }
    }
    StepAction::Callback(callback) => {
      info!(step = %step.name(), "running step");
      let callback = callback.clone();
      tokio::task::spawn_blocking(move || callback().map_err(|e| e.to_string()))
        .await
        .map_err(|e| failed(e.to_string()))?
        .map_err(failed)?;
    }
  }

  Ok(())
}
