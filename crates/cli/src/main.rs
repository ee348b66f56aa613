mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crossforge_lib::config::{Properties, parse_property};
use crossforge_lib::consts::BUILD_FILE_NAME;

use crate::cmd::RunArgs;
use crate::output::OutputFormat;

/// Cross-platform native build orchestration
#[derive(Parser)]
#[command(name = "crossforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the build file
  #[arg(short, long, global = true, default_value = BUILD_FILE_NAME)]
  file: PathBuf,

  /// Set a build property, e.g. `-P cross` or `-P profile=ci`
  #[arg(short = 'P', long = "property", global = true, value_name = "KEY[=VALUE]")]
  properties: Vec<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every target, or only the given projects, targets and steps
  Build {
    /// `project`, `project:target` or `step:name`
    refs: Vec<String>,

    #[command(flatten)]
    run: RunArgs,
  },

  /// Show the resolved targets and execution order without running anything
  Plan {
    refs: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Build the staged targets, then copy them under their release names
  Stage {
    #[command(flatten)]
    run: RunArgs,
  },

  /// Remove build output and fingerprint records
  Clean {
    /// Projects or targets to clean; everything when empty
    refs: Vec<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let properties: Properties = cli.properties.iter().map(|raw| parse_property(raw)).collect();

  match cli.command {
    Commands::Build { refs, run } => cmd::cmd_build(&cli.file, &properties, &refs, &run),
    Commands::Plan { refs, format } => cmd::cmd_plan(&cli.file, &properties, &refs, format),
    Commands::Stage { run } => cmd::cmd_stage(&cli.file, &properties, &run),
    Commands::Clean { refs } => cmd::cmd_clean(&cli.file, &properties, &refs),
  }
}
