//! Implementation of the `crossforge clean` command.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crossforge_lib::config::Properties;
use crossforge_lib::types::{NodeRef, TargetId};

use super::{load, parse_refs};
use crate::output::{print_info, print_path, print_success, symbols};

/// Remove build output and fingerprint records.
///
/// Whole projects lose their destination root, which holds the records too.
/// A single target loses its output directory and its record. Directories
/// that contain the project's sources are never removed.
pub fn cmd_clean(file: &Path, properties: &Properties, refs: &[String]) -> Result<()> {
  let loaded = load(file, properties)?;
  let plan = loaded.registry.plan().context("Invalid build configuration")?;

  let refs = parse_refs(refs)?;
  // Rejects unknown references.
  plan.closure(&refs)?;

  let mut roots: BTreeSet<PathBuf> = BTreeSet::new();
  let mut records: Vec<PathBuf> = Vec::new();
  for target in plan.targets() {
    // Only the named targets, not their prerequisites.
    if !refs.is_empty() && !refs.iter().any(|r| names(r, &target.id)) {
      continue;
    }
    let whole_project =
      refs.is_empty() || refs.iter().any(|r| matches!(r, NodeRef::Project(p) if p == &target.id.project));
    if whole_project && !target.source_dir.starts_with(&target.destination_root) {
      roots.insert(target.destination_root.clone());
      continue;
    }
    if target.source_dir.starts_with(&target.output_dir) {
      warn!(target = %target.id, dir = %target.output_dir.display(), "output directory contains sources, keeping it");
    } else {
      roots.insert(target.output_dir.clone());
    }
    records.push(target.state_file());
  }

  let mut removed = 0;
  for root in &roots {
    if root.exists() {
      std::fs::remove_dir_all(root).with_context(|| format!("Failed to remove {}", root.display()))?;
      print_path(symbols::REMOVE, root);
      removed += 1;
    }
  }
  for record in &records {
    match std::fs::remove_file(record) {
      Ok(()) => {
        print_path(symbols::REMOVE, record);
        removed += 1;
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => debug!(path = %record.display(), "no record"),
      Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", record.display())),
    }
  }

  if removed == 0 {
    print_info("Nothing to clean.");
  } else {
    print_success(&format!("Removed {} path(s)", removed));
  }
  Ok(())
}

fn names(node: &NodeRef, id: &TargetId) -> bool {
  match node {
    NodeRef::Target(target) => target == id,
    NodeRef::Project(project) => project == &id.project,
    NodeRef::Step(_) => false,
  }
}
