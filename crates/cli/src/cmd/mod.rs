mod build;
mod clean;
mod plan;
mod stage;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use plan::cmd_plan;
pub use stage::cmd_stage;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crossforge_lib::ExecuteConfig;
use crossforge_lib::config::{self, LoadedBuild, Properties};
use crossforge_lib::types::NodeRef;

/// Execution switches shared by `build` and `stage`. Each overrides the build file.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
  /// Maximum number of builds running at once
  #[arg(short = 'j', long)]
  pub parallelism: Option<usize>,

  /// Stop starting new builds after the first failure
  #[arg(long)]
  pub fail_fast: bool,

  /// Rebuild even when nothing changed
  #[arg(long)]
  pub force: bool,

  /// Deadline for each tool chain run, e.g. `10m`
  #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,
}

impl RunArgs {
  pub fn apply(&self, mut config: ExecuteConfig) -> ExecuteConfig {
    if let Some(parallelism) = self.parallelism {
      config.parallelism = parallelism.max(1);
    }
    config.fail_fast |= self.fail_fast;
    config.force |= self.force;
    if self.timeout.is_some() {
      config.timeout = self.timeout;
    }
    config
  }
}

fn load(file: &Path, properties: &Properties) -> Result<LoadedBuild> {
  config::load(file, properties).with_context(|| format!("Failed to load build file: {}", file.display()))
}

fn parse_refs(refs: &[String]) -> Result<Vec<NodeRef>> {
  refs
    .iter()
    .map(|raw| raw.parse::<NodeRef>().with_context(|| format!("Invalid reference: {}", raw)))
    .collect()
}
