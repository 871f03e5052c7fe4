//! Plan and step definitions.
//!
//! Plans are built programmatically by an upstream planner, one per turn.
//! The runtime consumes them once and never mutates the caller's copy.

use serde::{Deserialize, Serialize};

use crate::{failure::ErrorAction, ids::StepId};

/// Opaque parameter / result map passed to and returned from capabilities.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// One unit of work tagged with a capability kind and its dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Name of the registered capability that runs this step.
    pub capability_kind: String,
    #[serde(default)]
    pub params: Params,
    /// Ids of steps whose results this step consumes. Ids that are not in
    /// the plan are ignored.
    #[serde(default)]
    pub needs: Vec<StepId>,
    /// Blanket action applied to every failure of this step, taking
    /// priority over the policy table whatever the kind.
    #[serde(default)]
    pub on_error: Option<ErrorAction>,
}

impl Step {
    pub fn new(id: impl Into<StepId>, capability_kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capability_kind: capability_kind.into(),
            params: Params::new(),
            needs: Vec::new(),
            on_error: None,
        }
    }

    pub fn needs(mut self, id: impl Into<StepId>) -> Self {
        self.needs.push(id.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn on_error(mut self, action: ErrorAction) -> Self {
        self.on_error = Some(action);
        self
    }
}

/// An ordered set of steps forming a DAG.
///
/// Acyclicity is the caller's contract; the scheduler does not check it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn get(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl FromIterator<Step> for Plan {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
