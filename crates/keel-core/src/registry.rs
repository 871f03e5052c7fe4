//! Capability kind → implementation lookup.
//!
//! The registry is built once at process start by the composition root and
//! handed to the executor. Steps name their capability by kind; a kind with
//! no registration fails the step as `InvalidInput`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use keel_contracts::error::{KeelError, KeelResult};

use crate::traits::Capability;

#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    inner: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `capability` under `kind`, replacing any previous entry.
    pub fn register(&mut self, kind: impl Into<String>, capability: impl Capability + 'static) {
        let kind = kind.into();
        debug!(kind = %kind, "capability registered");
        self.inner.insert(kind, Arc::new(capability));
    }

    /// Builder form of `register`.
    pub fn with(mut self, kind: impl Into<String>, capability: impl Capability + 'static) -> Self {
        self.register(kind, capability);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Capability>> {
        self.inner.get(kind).cloned()
    }

    /// The capability for `kind`, or `CapabilityNotRegistered`.
    pub fn require(&self, kind: &str) -> KeelResult<Arc<dyn Capability>> {
        self.get(kind).ok_or_else(|| KeelError::CapabilityNotRegistered {
            kind: kind.to_string(),
        })
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use keel_contracts::{
        error::KeelError,
        failure::StepFailure,
        ids::StepId,
        plan::Params,
    };

    use super::CapabilityRegistry;

    fn noop(_: &Params, _: &BTreeMap<StepId, Params>) -> Result<Params, StepFailure> {
        Ok(Params::new())
    }

    #[test]
    fn require_reports_unregistered_kind() {
        let registry = CapabilityRegistry::new().with("fetch", noop);

        assert!(registry.require("fetch").is_ok());
        match registry.require("summarize") {
            Err(KeelError::CapabilityNotRegistered { kind }) => assert_eq!(kind, "summarize"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("summarize is not registered"),
        }
        assert_eq!(registry.kinds(), vec!["fetch"]);
    }
}
