//! Host detection and target-triple classification.

pub mod arch;
pub mod os;

use arch::Arch;
use os::Os;
use std::fmt;

use crate::error::ConfigError;

/// Architecture and OS family of a build platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the host platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Like [`Platform::current`], but as a configuration error naming the host.
  pub fn host() -> Result<Self, ConfigError> {
    Self::current().ok_or_else(|| ConfigError::UnsupportedHost {
      os: std::env::consts::OS.to_string(),
      arch: std::env::consts::ARCH.to_string(),
    })
  }

  /// Classify a full target triple such as `x86_64-pc-windows-gnu`.
  ///
  /// Unknown architectures and OS families are rejected instead of guessed.
  pub fn from_triple(triple: &str) -> Result<Self, ConfigError> {
    let unknown = || ConfigError::UnknownTriple {
      triple: triple.to_string(),
    };
    let arch = triple
      .split('-')
      .next()
      .and_then(Arch::from_triple_component)
      .ok_or_else(unknown)?;
    let os = Os::from_triple(triple).ok_or_else(unknown)?;
    Ok(Self { arch, os })
  }

  /// Returns a short platform label (e.g., "aarch64-darwin")
  pub fn label(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.label())
  }
}
