//! Per-kind failure action table.
//!
//! `PolicyTable` starts from the default action of every `ErrorKind` and can
//! be customised from TOML. It implements the `FailurePolicy` trait from
//! keel-core.
//!
//! Resolution in the executor is two-tier:
//!
//! 1. A step's `on_error` override, if set, wins for every kind.
//! 2. Otherwise the table entry for the raised kind is used.
//! 3. A kind with no entry aborts the plan.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use keel_contracts::{
    config::PolicyOverrides,
    error::{KeelError, KeelResult},
    failure::{ErrorAction, ErrorKind},
};
use keel_core::traits::FailurePolicy;

/// A `FailurePolicy` backed by an in-memory kind → action map.
///
/// ```rust,ignore
/// use keel_policy::PolicyTable;
///
/// let table = PolicyTable::from_toml_str(r#"
///     [actions]
///     rate_limit = "abort"
/// "#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    actions: HashMap<ErrorKind, ErrorAction>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            actions: ErrorKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.default_action()))
                .collect(),
        }
    }
}

impl PolicyTable {
    /// The default table with `overrides` applied on top.
    ///
    /// Returns `KeelError::ConfigError` if an override names a kind outside
    /// the taxonomy.
    pub fn from_overrides(overrides: &PolicyOverrides) -> KeelResult<Self> {
        let mut table = Self::default();
        for (name, action) in &overrides.actions {
            let kind: ErrorKind = name.parse().map_err(|reason| KeelError::ConfigError { reason })?;
            debug!(kind = %kind, action = %action, "policy override applied");
            table.actions.insert(kind, *action);
        }
        Ok(table)
    }

    /// Parse `s` as a TOML document with an `[actions]` table.
    pub fn from_toml_str(s: &str) -> KeelResult<Self> {
        let overrides: PolicyOverrides = toml::from_str(s).map_err(|e| KeelError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;
        Self::from_overrides(&overrides)
    }

    /// Read the file at `path` and parse it as policy TOML.
    pub fn from_file(path: &Path) -> KeelResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| KeelError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Set the action for `kind`.
    pub fn set(mut self, kind: ErrorKind, action: ErrorAction) -> Self {
        self.actions.insert(kind, action);
        self
    }

    /// Remove the entry for `kind`; failures of that kind then abort.
    pub fn without(mut self, kind: ErrorKind) -> Self {
        self.actions.remove(&kind);
        self
    }

    pub fn get(&self, kind: ErrorKind) -> Option<ErrorAction> {
        self.actions.get(&kind).copied()
    }
}

impl FailurePolicy for PolicyTable {
    fn action_for(&self, kind: ErrorKind) -> Option<ErrorAction> {
        self.get(kind)
    }
}
