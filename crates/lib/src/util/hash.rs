//! Hashing utilities for staleness checks.
//!
//! - `ContentHash`: a full 64-character SHA-256 digest
//! - `hash_directory()`: deterministic source tree hashing
//! - `hash_file()`: single file hashing
//! - `hash_bytes()` / `hash_json()`: arbitrary data

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character SHA-256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error during directory hashing.
#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },

  #[error("failed to serialize hash input: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// What to leave out of a directory hash.
#[derive(Debug, Clone, Default)]
pub struct Exclusions<'a> {
  /// File or directory names skipped wherever they appear.
  pub names: &'a [&'a str],
  /// Absolute paths skipped, e.g. an output directory nested in the sources.
  pub paths: Vec<PathBuf>,
}

impl<'a> Exclusions<'a> {
  pub fn names(names: &'a [&'a str]) -> Self {
    Self {
      names,
      paths: Vec::new(),
    }
  }

  pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.paths.push(path.into());
    self
  }

  fn skips(&self, entry: &walkdir::DirEntry) -> bool {
    let by_name = entry
      .file_name()
      .to_str()
      .map(|name| self.names.contains(&name))
      .unwrap_or(false);
    by_name || self.paths.iter().any(|p| entry.path() == p)
  }
}

/// Compute a deterministic hash of a directory's contents.
///
/// Covers file contents, directory structure and symlink targets; timestamps
/// and permissions are ignored. The root itself is never excluded.
pub fn hash_directory(path: &Path, exclude: &Exclusions<'_>) -> Result<ContentHash, DirHashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  let walker = WalkDir::new(path)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !exclude.skips(e));

  for entry in walker {
    let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_hash = if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| DirHashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()))
    } else {
      continue;
    };

    entries.push((rel_path, entry_hash));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, entry_hash) in entries {
    hasher.update(entry_hash.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, DirHashError> {
  let read_error = |e: std::io::Error| DirHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  };
  let mut file = fs::File::open(path).map_err(read_error)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_error)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// Hash the JSON serialization of a value.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, DirHashError> {
  Ok(hash_bytes(serde_json::to_string(value)?.as_bytes()))
}
