//! Path helpers.

use std::path::{Component, Path, PathBuf};

/// `path` anchored to the working directory, with `.` and `..` folded away.
///
/// Works on paths that don't exist yet. Symlinks are not resolved, so two
/// spellings of the same directory through different links stay different.
pub fn absolute(path: &Path) -> std::io::Result<PathBuf> {
  let anchored = std::path::absolute(path)?;
  let mut normalized = PathBuf::new();
  for component in anchored.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      Component::Prefix(_) | Component::RootDir | Component::Normal(_) => normalized.push(component.as_os_str()),
    }
  }
  Ok(normalized)
}
