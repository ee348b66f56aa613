//! crossforge-lib: cross-platform native build orchestration.
//!
//! This crate provides the core of crossforge:
//! - `Registry`: projects, their per-platform targets and external steps
//! - `EnvScope`: inheritable process environments
//! - `BuildPlan`: the finalized, validated dependency graph
//! - `execute`: parallel, incremental execution of a plan
//! - `stage`: copying finished binaries under conventional names

pub mod config;
pub mod consts;
pub mod env;
pub mod error;
pub mod execute;
pub mod plan;
pub mod platform;
pub mod project;
pub mod registry;
pub mod stage;
pub mod step;
pub mod target;
pub mod toolchain;
pub mod types;
pub mod util;

pub use env::{EnvScope, ResolvedEnvironment};
pub use error::ConfigError;
pub use execute::{ExecuteConfig, ExecuteError, RunReport};
pub use plan::BuildPlan;
pub use registry::Registry;
pub use stage::{StageAlias, StagingSpec};
pub use step::{Step, StepAction};
pub use toolchain::ToolChain;
pub use types::{NodeRef, TargetId};
