//! Core trait definitions for the KEEL execution pipeline.
//!
//! These traits are the executor's only view of the outside world:
//!
//! - `Capability`: a step body (may call a model, GitHub, anything)
//! - `FailurePolicy`: maps a failure kind to the action the executor takes
//! - `ArtifactSink`: content-addressed persistence for step outputs
//! - `EventSink`: append-only trace event store
//! - `Sleeper`: the retry backoff delay
//!
//! The leaf crates (`keel-policy`, `keel-store`, `keel-trace`) provide the
//! production implementations. Tests substitute isolated mocks.

use std::collections::BTreeMap;
use std::time::Duration;

use keel_contracts::{
    error::KeelResult,
    event::TraceEvent,
    failure::{ErrorAction, ErrorKind, StepFailure},
    ids::{ArtifactId, SessionId, StepId, TurnId},
    plan::Params,
};

/// The body of one capability kind.
///
/// Called once per attempt with the step's (possibly substituted) params
/// and the results of its in-plan dependencies. Implementations block for
/// as long as they need; the executor imposes no timeout of its own.
pub trait Capability: Send + Sync {
    fn invoke(
        &self,
        params: &Params,
        dependencies: &BTreeMap<StepId, Params>,
    ) -> Result<Params, StepFailure>;
}

impl<F> Capability for F
where
    F: Fn(&Params, &BTreeMap<StepId, Params>) -> Result<Params, StepFailure> + Send + Sync,
{
    fn invoke(
        &self,
        params: &Params,
        dependencies: &BTreeMap<StepId, Params>,
    ) -> Result<Params, StepFailure> {
        self(params, dependencies)
    }
}

/// The global per-kind action table.
///
/// Consulted only when the failing step carries no `on_error` override.
pub trait FailurePolicy: Send + Sync {
    /// The action for `kind`, or `None` if the table has no entry for it.
    /// The executor treats `None` as `Abort`.
    fn action_for(&self, kind: ErrorKind) -> Option<ErrorAction>;
}

/// Content-addressed persistence for step outputs.
pub trait ArtifactSink: Send + Sync {
    /// Persist `content` under `kind` and return its content-derived id.
    ///
    /// Persisting identical content under the same kind must return the
    /// same id.
    fn persist(
        &self,
        session_id: &SessionId,
        turn_id: Option<&TurnId>,
        kind: &str,
        content: &serde_json::Value,
    ) -> KeelResult<ArtifactId>;
}

/// Append-only store of trace events.
///
/// Shared by every step of a level, so implementations synchronise
/// internally.
pub trait EventSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// The only suspension point in a plan run: the delay before a retry.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread for the full backoff.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
