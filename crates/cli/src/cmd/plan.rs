//! Implementation of the `crossforge plan` command.
//!
//! Resolves every target and prints what a build would run, wave by wave,
//! without invoking any tool chain.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crossforge_lib::config::Properties;
use crossforge_lib::execute::DagNode;
use crossforge_lib::target::ResolvedTarget;

use super::{load, parse_refs};
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};

#[derive(Serialize)]
struct PlanOutput<'a> {
  waves: Vec<Vec<String>>,
  targets: Vec<&'a ResolvedTarget>,
}

pub fn cmd_plan(file: &Path, properties: &Properties, refs: &[String], format: OutputFormat) -> Result<()> {
  let loaded = load(file, properties)?;
  let plan = loaded.registry.plan().context("Invalid build configuration")?;

  let selection = if refs.is_empty() {
    None
  } else {
    Some(plan.closure(&parse_refs(refs)?)?)
  };

  let waves: Vec<Vec<DagNode>> = plan
    .dag()
    .execution_waves()
    .into_iter()
    .map(|wave| {
      wave
        .into_iter()
        .filter(|node| selection.as_ref().is_none_or(|s| s.contains(node)))
        .collect::<Vec<_>>()
    })
    .filter(|wave| !wave.is_empty())
    .collect();

  if format.is_json() {
    let targets: Vec<_> = waves
      .iter()
      .flatten()
      .filter_map(|node| match node {
        DagNode::Target(id) => plan.target(id),
        DagNode::Step(_) => None,
      })
      .collect();
    let wave_names: Vec<Vec<String>> = waves
      .iter()
      .map(|wave| wave.iter().map(ToString::to_string).collect())
      .collect();
    return print_json(&PlanOutput {
      waves: wave_names,
      targets,
    });
  }

  if waves.is_empty() {
    print_info("Nothing to build.");
    return Ok(());
  }

  for (i, wave) in waves.iter().enumerate() {
    println!("Wave {}:", i + 1);
    for node in wave {
      println!("  {} {}", symbols::INFO, node);
      if let DagNode::Target(id) = node
        && let Some(target) = plan.target(id)
      {
        print_stat("  binary", &target.binary_path.display().to_string());
        print_stat("  command", &target.command_line());
        print_stat("  cwd", &target.source_dir.display().to_string());
      }
    }
  }

  println!();
  print_stat("Targets", &plan.targets().count().to_string());
  print_stat("Steps", &plan.steps().count().to_string());
  Ok(())
}
