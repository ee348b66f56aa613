//! Implementation of the `crossforge stage` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};

use crossforge_lib::config::Properties;
use crossforge_lib::stage;

use super::build::print_report;
use super::{RunArgs, load};
use crate::output::{print_info, print_path, symbols};

/// Build exactly the targets the `[stage]` section names, then copy them out.
pub fn cmd_stage(file: &Path, properties: &Properties, args: &RunArgs) -> Result<()> {
  let loaded = load(file, properties)?;
  let Some(spec) = &loaded.stage else {
    bail!("{} has no [stage] section", file.display());
  };
  let config = args.apply(loaded.execute.clone());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();
  let report = rt
    .block_on(stage::release(&loaded.registry, spec, &config))
    .context("Stage failed")?;

  print_report(&report.run, start.elapsed());

  if !report.run.is_success() {
    bail!("Build failed, nothing staged");
  }

  println!();
  print_info(&format!("Staged into {}", spec.output_dir.display()));
  for path in &report.staged {
    print_path(symbols::PLUS, path);
  }
  Ok(())
}
