//! Tool chain selection and resolution.
//!
//! A [`ToolChain`] is only a selector until [`resolve`] turns it into an
//! executable path. Resolution happens once, at plan time, and never falls
//! back silently: a missing host tool chain is a configuration error.

pub mod naming;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

pub use naming::{ArtifactKind, file_name, name_for};

const CARGO: &str = "cargo";
const CROSS: &str = "cross";

/// Which compiler front-end builds a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChain {
  /// The host `cargo`, auto-detected.
  #[default]
  Default,
  /// The containerised cross-compilation wrapper `cross`.
  Cross,
  /// An explicitly supplied executable.
  Custom(PathBuf),
}

impl ToolChain {
  pub fn custom(path: impl Into<PathBuf>) -> Self {
    Self::Custom(path.into())
  }
}

impl fmt::Display for ToolChain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ToolChain::Default => write!(f, "default"),
      ToolChain::Cross => write!(f, "cross"),
      ToolChain::Custom(path) => write!(f, "custom({})", path.display()),
    }
  }
}

/// A tool chain with its executable located.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedToolChain {
  pub selector: ToolChain,
  pub executable: PathBuf,
}

impl ResolvedToolChain {
  /// Stable identity used in staleness fingerprints.
  pub fn identity(&self) -> String {
    format!("{}:{}", self.selector, self.executable.display())
  }

  /// See [`naming::name_for`].
  pub fn name_for(
    &self,
    triple: Option<&str>,
    kind: ArtifactKind,
  ) -> Result<(&'static str, &'static str), ConfigError> {
    name_for(triple, kind)
  }
}

/// Locate the executable for a tool chain selector.
pub fn resolve(selector: &ToolChain) -> Result<ResolvedToolChain, ConfigError> {
  let executable = match selector {
    ToolChain::Default => find_cargo().ok_or_else(|| ConfigError::ToolChainNotFound {
      requirement: CARGO.to_string(),
    })?,
    ToolChain::Cross => which::which(CROSS).map_err(|_| ConfigError::ToolChainNotFound {
      requirement: CROSS.to_string(),
    })?,
    ToolChain::Custom(path) => path.clone(),
  };

  debug!(tool_chain = %selector, executable = %executable.display(), "resolved tool chain");

  Ok(ResolvedToolChain {
    selector: selector.clone(),
    executable,
  })
}

/// Search path first, then the cargo home rustup installs into.
fn find_cargo() -> Option<PathBuf> {
  if let Ok(path) = which::which(CARGO) {
    return Some(path);
  }

  let exe = format!("{}{}", CARGO, std::env::consts::EXE_SUFFIX);
  let cargo_home = std::env::var_os("CARGO_HOME")
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".cargo")))?;

  let candidate = cargo_home.join("bin").join(exe);
  is_file(&candidate).then_some(candidate)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(windows))]
fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

fn is_file(path: &Path) -> bool {
  path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
