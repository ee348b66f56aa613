//! Per-platform binary naming conventions.

use serde::{Deserialize, Serialize};

use crate::consts::CURRENT_TARGET;
use crate::error::ConfigError;
use crate::platform::Platform;
use crate::platform::os::Os;

/// What kind of file a target produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
  #[default]
  Executable,
  DynamicLibrary,
}

/// Returns the `(prefix, suffix)` wrapped around a target name.
///
/// `triple` is `None` (or `""`/`"current"`) for the host platform. Triples
/// whose OS family is unknown are a configuration error, never a guess.
pub fn name_for(triple: Option<&str>, kind: ArtifactKind) -> Result<(&'static str, &'static str), ConfigError> {
  let platform = match triple {
    None | Some("") | Some(CURRENT_TARGET) => Platform::host()?,
    Some(triple) => Platform::from_triple(triple)?,
  };
  Ok(affixes(platform.os, kind))
}

/// Builds the full file name `prefix + name + suffix`.
pub fn file_name(triple: Option<&str>, kind: ArtifactKind, name: &str) -> Result<String, ConfigError> {
  let (prefix, suffix) = name_for(triple, kind)?;
  Ok(format!("{}{}{}", prefix, name, suffix))
}

fn affixes(os: Os, kind: ArtifactKind) -> (&'static str, &'static str) {
  match (kind, os) {
    (ArtifactKind::Executable, Os::Windows) => ("", ".exe"),
    (ArtifactKind::Executable, Os::MacOs | Os::Linux) => ("", ""),
    (ArtifactKind::DynamicLibrary, Os::Windows) => ("", ".dll"),
    (ArtifactKind::DynamicLibrary, Os::MacOs) => ("lib", ".dylib"),
    (ArtifactKind::DynamicLibrary, Os::Linux) => ("lib", ".so"),
  }
}
