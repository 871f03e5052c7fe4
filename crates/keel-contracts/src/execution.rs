//! Plan-run state and the report returned to callers.
//!
//! `ExecutionContext` is the mutable state of one plan run. It is created by
//! the executor, updated after every step, and converted into an
//! `ExecutionReport` once all levels resolve (or the plan aborts).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    failure::{ErrorAction, ErrorKind},
    ids::{ArtifactId, SessionId, StepId, TurnId},
    plan::Params,
};

/// Overall outcome of a plan run.
///
/// Precedence when several conditions hold: `Aborted` > `Disambiguation` >
/// `Partial` > `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Partial,
    Aborted,
    Disambiguation,
}

/// The recorded result of one successful (or degraded) step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub result: Params,
    #[serde(default)]
    pub artifact_ids: Vec<ArtifactId>,
}

/// An unresolved step failure written to the error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub id: StepId,
    pub kind: ErrorKind,
    pub message: String,
    pub action: ErrorAction,
}

/// Mutable state for a single plan run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub results: BTreeMap<StepId, Params>,
    pub artifacts: BTreeMap<StepId, Vec<ArtifactId>>,
    pub errors: Vec<RecordedError>,
    pub aborted: bool,
    /// Set whenever a failure resolves to `AskUser`.
    pub needs_disambiguation: bool,
    /// Set when a capability explicitly asked for user clarification.
    pub disambiguation_requested: bool,
}

impl ExecutionContext {
    pub fn new(session_id: SessionId, turn_id: TurnId) -> Self {
        Self {
            session_id,
            turn_id,
            results: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            errors: Vec::new(),
            aborted: false,
            needs_disambiguation: false,
            disambiguation_requested: false,
        }
    }

    /// Compute the final status from the flags and the error log.
    pub fn status(&self) -> ExecutionStatus {
        if self.aborted {
            ExecutionStatus::Aborted
        } else if self.disambiguation_requested {
            ExecutionStatus::Disambiguation
        } else if !self.errors.is_empty() {
            ExecutionStatus::Partial
        } else {
            ExecutionStatus::Completed
        }
    }

    /// Results of the given dependencies that have already been computed.
    ///
    /// Ids without a result (not in the plan, or failed) are skipped.
    pub fn dependency_results(&self, needs: &[StepId]) -> BTreeMap<StepId, Params> {
        needs
            .iter()
            .filter_map(|id| self.results.get(id).map(|r| (id.clone(), r.clone())))
            .collect()
    }

    pub fn into_report(self) -> ExecutionReport {
        let status = self.status();
        let results = self
            .results
            .into_iter()
            .map(|(id, result)| {
                let artifact_ids = self.artifacts.get(&id).cloned().unwrap_or_default();
                (id, StepOutput { result, artifact_ids })
            })
            .collect();

        ExecutionReport {
            session_id: self.session_id,
            turn_id: self.turn_id,
            results,
            artifacts: self.artifacts,
            errors: self.errors,
            status,
            needs_disambiguation: self.needs_disambiguation,
        }
    }
}

/// What the executor hands back to the calling layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub results: BTreeMap<StepId, StepOutput>,
    pub artifacts: BTreeMap<StepId, Vec<ArtifactId>>,
    pub errors: Vec<RecordedError>,
    pub status: ExecutionStatus,
    /// True if any step degraded to an `ask_user` marker, even when the
    /// status stays `completed`.
    pub needs_disambiguation: bool,
}

impl ExecutionReport {
    pub fn result(&self, id: &str) -> Option<&Params> {
        self.results.get(&StepId::from(id)).map(|o| &o.result)
    }
}
