//! Inheritable environment-variable scopes.
//!
//! A scope holds local overrides plus an ordered list of parent scopes.
//! Reading [`EnvScope::all_environment`] folds the parents left to right, then
//! applies the local entries, so later parents beat earlier ones and local
//! entries beat every parent. Nothing is cached: a read after a mutation of any
//! scope in the chain sees the mutation.
//!
//! Scopes are shared handles. Cloning an `EnvScope` clones the handle, not the
//! variables.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Default)]
struct ScopeState {
  parents: Vec<EnvScope>,
  /// `None` unsets an inherited variable.
  local: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct EnvScope {
  inner: Arc<RwLock<ScopeState>>,
}

/// Immutable snapshot of a scope, ready to apply to a process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedEnvironment {
  /// Variables to set.
  pub vars: BTreeMap<String, String>,
  /// Variables to remove from the inherited process environment.
  pub unset: BTreeSet<String>,
}

impl ResolvedEnvironment {
  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(name).map(String::as_str)
  }
}

impl EnvScope {
  pub fn new() -> Self {
    Self::default()
  }

  fn read(&self) -> RwLockReadGuard<'_, ScopeState> {
    self.inner.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, ScopeState> {
    self.inner.write().unwrap_or_else(|e| e.into_inner())
  }

  /// Append a parent. Parents added later take precedence over earlier ones.
  pub fn extends_from(&self, parent: &EnvScope) -> Result<(), ConfigError> {
    if parent.is_or_inherits(self) {
      return Err(ConfigError::EnvironmentCycle);
    }
    self.write().parents.push(parent.clone());
    Ok(())
  }

  /// Set a local override. `None` unsets the variable for this scope.
  pub fn set(&self, name: impl Into<String>, value: Option<impl Into<String>>) {
    self.write().local.insert(name.into(), value.map(Into::into));
  }

  /// Set several local overrides at once.
  pub fn set_all<K, V>(&self, vars: impl IntoIterator<Item = (K, Option<V>)>)
  where
    K: Into<String>,
    V: Into<String>,
  {
    let mut state = self.write();
    for (name, value) in vars {
      state.local.insert(name.into(), value.map(Into::into));
    }
  }

  /// Shorthand for `set(name, None)`.
  pub fn unset(&self, name: impl Into<String>) {
    self.write().local.insert(name.into(), None);
  }

  /// Local overrides only, without inherited values.
  pub fn local(&self) -> BTreeMap<String, Option<String>> {
    self.read().local.clone()
  }

  /// The merged view of all parents and local overrides.
  pub fn all_environment(&self) -> ResolvedEnvironment {
    let mut resolved = ResolvedEnvironment::default();
    self.merge_into(&mut resolved);
    resolved
  }

  fn merge_into(&self, resolved: &mut ResolvedEnvironment) {
    let state = self.read();
    for parent in &state.parents {
      parent.merge_into(resolved);
    }
    for (name, value) in &state.local {
      match value {
        Some(value) => {
          resolved.unset.remove(name);
          resolved.vars.insert(name.clone(), value.clone());
        }
        None => {
          resolved.vars.remove(name);
          resolved.unset.insert(name.clone());
        }
      }
    }
  }

  fn same(&self, other: &EnvScope) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }

  fn is_or_inherits(&self, other: &EnvScope) -> bool {
    self.same(other) || self.read().parents.iter().any(|p| p.is_or_inherits(other))
  }
}
