//! Implementation of the `crossforge build` command.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use crossforge_lib::RunReport;
use crossforge_lib::config::Properties;
use crossforge_lib::execute::{self, ExecuteError};

use super::{RunArgs, load, parse_refs};
use crate::output::{
  format_duration, print_built, print_error, print_stat, print_success, print_up_to_date, print_warning,
};

/// Run every target and step, or the closure of `refs`.
///
/// Exits with an error when anything failed, was skipped or was cancelled.
pub fn cmd_build(file: &Path, properties: &Properties, refs: &[String], args: &RunArgs) -> Result<()> {
  let loaded = load(file, properties)?;
  let config = args.apply(loaded.execute.clone());
  let plan = loaded.registry.plan().context("Invalid build configuration")?;

  let selection = if refs.is_empty() {
    None
  } else {
    Some(plan.closure(&parse_refs(refs)?)?)
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();
  let report = rt.block_on(execute::execute_nodes(&plan, selection.as_ref(), &config));

  print_report(&report, start.elapsed());

  if !report.is_success() {
    bail!("Build failed");
  }
  Ok(())
}

/// Summary shared by `build` and `stage`.
pub(super) fn print_report(report: &RunReport, elapsed: Duration) {
  for (id, binary) in &report.built {
    print_built(id, binary);
  }
  for id in report.up_to_date.keys() {
    print_up_to_date(id);
  }

  for (node, err) in &report.failed {
    print_error(&format!("{}: {}", node, err));
    if let ExecuteError::BuildFailed { command, .. } = err {
      print_stat("command", command);
    }
  }
  for (node, cause) in &report.skipped {
    print_warning(&format!("{} skipped, {} failed", node, cause));
  }
  for node in &report.cancelled {
    print_warning(&format!("{} cancelled", node));
  }

  println!();
  if report.is_success() {
    print_success(&format!("Finished in {}", format_duration(elapsed)));
  }
  print_stat("Built", &report.built.len().to_string());
  print_stat("Up to date", &report.up_to_date.len().to_string());
  print_stat("Steps", &report.steps_completed.len().to_string());
  if !report.is_success() {
    print_stat("Failed", &report.failed.len().to_string());
    print_stat("Skipped", &(report.skipped.len() + report.cancelled.len()).to_string());
  }
}
