//! Staleness check.
//!
//! A target's fingerprint hashes everything that decides its output: the
//! declared inputs (paths, tool chain identity, triple, mode, environment,
//! argument list), the source tree and the manifest. After a verified build
//! the fingerprint is recorded next to the outputs; a later run with the same
//! fingerprint and an existing binary skips the tool chain entirely.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::consts::FINGERPRINT_EXCLUSIONS;
use crate::execute::types::ExecuteError;
use crate::target::{InputSet, ResolvedTarget};
use crate::util::hash::{ContentHash, Exclusions, hash_directory, hash_file, hash_json};

/// Record format version. Bumping it invalidates every record.
pub const RECORD_VERSION: u32 = 1;

/// Contents of a target's state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
  pub version: u32,
  pub fingerprint: String,
  pub binary: PathBuf,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
  version: u32,
  inputs: InputSet<'a>,
  sources: ContentHash,
  manifest: Option<ContentHash>,
}

/// Hash the current inputs of a target.
///
/// The destination root is left out of the source hash even when it is
/// nested inside the source directory.
pub fn compute(target: &ResolvedTarget) -> Result<ContentHash, ExecuteError> {
  let exclude = Exclusions::names(FINGERPRINT_EXCLUSIONS).with_path(&target.destination_root);
  let sources = hash_directory(&target.source_dir, &exclude)?;
  let manifest = if target.manifest_path.is_file() {
    Some(hash_file(&target.manifest_path)?)
  } else {
    None
  };

  Ok(hash_json(&FingerprintInput {
    version: RECORD_VERSION,
    inputs: target.inputs(),
    sources,
    manifest,
  })?)
}

/// [`compute`] on the blocking pool, keeping source walks off the runtime's
/// worker threads.
pub async fn compute_blocking(target: &ResolvedTarget) -> Result<ContentHash, ExecuteError> {
  let target = target.clone();
  tokio::task::spawn_blocking(move || compute(&target))
    .await
    .map_err(std::io::Error::other)?
}

/// Read a state file. Missing, unreadable or outdated records count as absent.
pub async fn read_record(path: &Path) -> Option<FingerprintRecord> {
  let content = fs::read_to_string(path).await.ok()?;
  match serde_json::from_str::<FingerprintRecord>(&content) {
    Ok(record) if record.version == RECORD_VERSION => Some(record),
    Ok(record) => {
      debug!(path = %path.display(), version = record.version, "ignoring outdated fingerprint record");
      None
    }
    Err(e) => {
      debug!(path = %path.display(), error = %e, "ignoring unreadable fingerprint record");
      None
    }
  }
}

pub async fn write_record(path: &Path, record: &FingerprintRecord) -> Result<(), ExecuteError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).await?;
  }
  let content = serde_json::to_string_pretty(record).map_err(std::io::Error::other)?;
  fs::write(path, format!("{content}\n")).await?;
  Ok(())
}

/// Forget a target's last build. A missing record is fine.
pub async fn remove_record(path: &Path) -> Result<(), ExecuteError> {
  match fs::remove_file(path).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e.into()),
  }
}

/// Whether the recorded build still matches `fingerprint`.
pub async fn is_up_to_date(target: &ResolvedTarget, fingerprint: &ContentHash) -> bool {
  let Some(record) = read_record(&target.state_file()).await else {
    debug!(target = %target.id, "no fingerprint record");
    return false;
  };

  let fresh =
    record.fingerprint == fingerprint.0 && record.binary == target.binary_path && target.binary_path.is_file();
  debug!(target = %target.id, fresh, "checked fingerprint record");
  fresh
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::Registry;
  use crate::toolchain::ToolChain;
  use crate::types::TargetId;
  use tempfile::TempDir;

  struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    registry: Registry,
  }

  fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("launcher");
    std::fs::create_dir_all(source.join("src")).unwrap();
    std::fs::write(source.join("Cargo.toml"), "[package]\nname = \"launcher\"\n").unwrap();
    std::fs::write(source.join("src/main.rs"), "fn main() {}\n").unwrap();

    let mut registry = Registry::new(temp.path().join("build"));
    registry.set_tool_chain(ToolChain::custom("/opt/cargo"));
    registry
      .new_project("native", |p| {
        // Output nested in the source tree, as a plain `cargo build` would do.
        p.source_dir(&source).destination_dir(source.join("out"));
      })
      .unwrap()
      .new_target("current", |_| {})
      .unwrap();

    Fixture {
      _temp: temp,
      source,
      registry,
    }
  }

  fn resolved(fixture: &Fixture) -> ResolvedTarget {
    fixture
      .registry
      .plan()
      .unwrap()
      .target(&TargetId::new("native", "current"))
      .unwrap()
      .clone()
  }

  #[test]
  fn fingerprint_is_stable() {
    let f = fixture();
    let target = resolved(&f);
    assert_eq!(compute(&target).unwrap(), compute(&target).unwrap());
  }

  #[test]
  fn fingerprint_tracks_sources_and_environment() {
    let f = fixture();
    let before = compute(&resolved(&f)).unwrap();

    std::fs::write(f.source.join("src/main.rs"), "fn main() { println!(\"hi\"); }\n").unwrap();
    let edited = compute(&resolved(&f)).unwrap();
    assert_ne!(before, edited);

    f.registry.env().set("RUSTFLAGS", Some("-C target-cpu=native"));
    assert_ne!(edited, compute(&resolved(&f)).unwrap());
  }

  #[test]
  fn fingerprint_ignores_outputs_and_vcs() {
    let f = fixture();
    let before = compute(&resolved(&f)).unwrap();

    std::fs::create_dir_all(f.source.join("out/release")).unwrap();
    std::fs::write(f.source.join("out/release/launcher"), "binary").unwrap();
    std::fs::create_dir_all(f.source.join(".git")).unwrap();
    std::fs::write(f.source.join(".git/HEAD"), "ref: main").unwrap();
    std::fs::create_dir_all(f.source.join("target")).unwrap();
    std::fs::write(f.source.join("target/stale"), "x").unwrap();

    assert_eq!(before, compute(&resolved(&f)).unwrap());
  }

  #[tokio::test]
  async fn record_round_trip_and_freshness() {
    let f = fixture();
    let target = resolved(&f);
    let fingerprint = compute(&target).unwrap();

    assert!(!is_up_to_date(&target, &fingerprint).await);

    std::fs::create_dir_all(&target.output_dir).unwrap();
    std::fs::write(&target.binary_path, "binary").unwrap();
    let record = FingerprintRecord {
      version: RECORD_VERSION,
      fingerprint: fingerprint.0.clone(),
      binary: target.binary_path.clone(),
    };
    write_record(&target.state_file(), &record).await.unwrap();

    assert_eq!(read_record(&target.state_file()).await, Some(record));
    assert!(is_up_to_date(&target, &fingerprint).await);

    std::fs::remove_file(&target.binary_path).unwrap();
    assert!(!is_up_to_date(&target, &fingerprint).await);
  }

  #[tokio::test]
  async fn blocking_fingerprint_matches_inline() {
    let f = fixture();
    let target = resolved(&f);
    assert_eq!(compute_blocking(&target).await.unwrap(), compute(&target).unwrap());

    std::fs::remove_dir_all(&f.source).unwrap();
    assert!(matches!(compute_blocking(&target).await, Err(ExecuteError::Hash(_))));
  }

  #[tokio::test]
  async fn corrupt_record_counts_as_absent() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_eq!(read_record(&path).await, None);

    std::fs::write(&path, r#"{"version":0,"fingerprint":"x","binary":"/b"}"#).unwrap();
    assert_eq!(read_record(&path).await, None);
  }

  #[tokio::test]
  async fn removing_a_missing_record_is_fine() {
    let temp = TempDir::new().unwrap();
    remove_record(&temp.path().join("absent.json")).await.unwrap();
  }
}
