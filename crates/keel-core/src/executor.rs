//! The KEEL executor: runs a plan level by level under a failure policy.
//!
//! Per plan run:
//!
//!   schedule → for each level: [gather deps → invoke → classify → react] → status
//!
//! Step failures never escape `Executor::run`. Each one resolves to a
//! degraded-but-successful result (`Fallback` / `AskUser`), a bounded retry
//! whose exhaustion leaves one recorded error, or a plan-wide abort.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use keel_contracts::{
    config::ExecutorConfig,
    event::{EventType, TraceContext, TraceEvent},
    execution::{ExecutionContext, ExecutionReport, RecordedError},
    failure::{ErrorAction, ErrorKind, StepFailure},
    ids::{ArtifactId, SessionId, StepId, TurnId},
    plan::{Params, Plan, Step},
};

use crate::{
    registry::CapabilityRegistry,
    scheduler::schedule,
    span::SpanGuard,
    traits::{ArtifactSink, EventSink, FailurePolicy, Sleeper, ThreadSleeper},
};

/// How a single step ended after all of its attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The capability returned a result.
    Succeeded {
        result: Params,
        artifact_ids: Vec<ArtifactId>,
    },
    /// The failure was absorbed; `result` is a `fallback` or `ask_user` marker.
    Degraded {
        result: Params,
        action: ErrorAction,
        disambiguation_requested: bool,
    },
    /// Retries ran out; the error is recorded and the level continues.
    Failed(RecordedError),
    /// The failure resolved to `Abort`.
    Aborted(RecordedError),
}

/// Marker recorded as the result of a degraded step.
pub fn marker(action: ErrorAction) -> Params {
    let mut result = Params::new();
    result.insert(action.as_str().to_string(), serde_json::Value::Bool(true));
    result
}

/// Actor name used on a step's trace events.
pub fn actor_for(capability_kind: &str) -> String {
    format!("{capability_kind}_agent")
}

/// Drives plan runs against a fixed set of capabilities and shared stores.
///
/// One executor serves many plan runs. The artifact and event stores are
/// process-wide and shared across concurrently executing steps.
pub struct Executor {
    registry: CapabilityRegistry,
    policy: Box<dyn FailurePolicy>,
    artifacts: Arc<dyn ArtifactSink>,
    events: Arc<dyn EventSink>,
    sleeper: Box<dyn Sleeper>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        registry: CapabilityRegistry,
        policy: Box<dyn FailurePolicy>,
        artifacts: Arc<dyn ArtifactSink>,
        events: Arc<dyn EventSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            policy,
            artifacts,
            events,
            sleeper: Box::new(ThreadSleeper),
            config,
        }
    }

    /// Replace the backoff sleeper (tests use a no-op).
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `plan` for one turn of `session_id`.
    ///
    /// Levels run strictly in order. The abort flag is checked before each
    /// level and, when running sequentially, before each step.
    pub fn run(&self, plan: &Plan, session_id: &SessionId, turn_id: &TurnId) -> ExecutionReport {
        let mut exec = ExecutionContext::new(session_id.clone(), turn_id.clone());
        let root = TraceContext::new(session_id.clone(), turn_id.clone());
        let mut plan_span = SpanGuard::enter(
            self.events.as_ref(),
            &root,
            "plan",
            "executor",
            Some(format!("{} steps", plan.len())),
        );

        let levels = schedule(plan);
        info!(
            session_id = %session_id,
            turn_id = %turn_id,
            steps = plan.len(),
            levels = levels.len(),
            parallel = self.config.parallel_levels,
            "plan run starting"
        );

        for (depth, level) in levels.iter().enumerate() {
            if exec.aborted {
                debug!(level = depth, "plan aborted, skipping remaining levels");
                break;
            }

            let steps: Vec<&Step> = level.iter().filter_map(|id| plan.get(id)).collect();
            debug!(level = depth, width = steps.len(), "running level");

            if self.config.parallel_levels && steps.len() > 1 {
                self.run_level_parallel(&steps, &mut exec, plan_span.ctx());
            } else {
                for step in steps {
                    if exec.aborted {
                        debug!(step_id = %step.id, "plan aborted, skipping step");
                        continue;
                    }
                    let deps = exec.dependency_results(&step.needs);
                    let outcome = self.run_step(step, deps, plan_span.ctx());
                    apply_outcome(&mut exec, &step.id, outcome);
                }
            }
        }

        let status = exec.status();
        plan_span.set_output(format!("{:?}", status));
        info!(
            session_id = %session_id,
            turn_id = %turn_id,
            status = ?status,
            errors = exec.errors.len(),
            "plan run finished"
        );

        exec.into_report()
    }

    /// Dispatch every step of a level on its own scoped thread, then merge
    /// the outcomes in plan order.
    fn run_level_parallel(&self, steps: &[&Step], exec: &mut ExecutionContext, ctx: &TraceContext) {
        let inputs: Vec<(&Step, BTreeMap<StepId, Params>)> = steps
            .iter()
            .map(|step| (*step, exec.dependency_results(&step.needs)))
            .collect();

        let outcomes: Vec<(StepId, StepOutcome)> = std::thread::scope(|scope| {
            let handles: Vec<_> = inputs
                .into_iter()
                .map(|(step, deps)| {
                    let handle = scope.spawn(move || self.run_step(step, deps, ctx));
                    (step, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(step, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        warn!(step_id = %step.id, "capability panicked");
                        StepOutcome::Aborted(RecordedError {
                            id: step.id.clone(),
                            kind: ErrorKind::Unknown,
                            message: "capability panicked".to_string(),
                            action: ErrorAction::Abort,
                        })
                    });
                    (step.id.clone(), outcome)
                })
                .collect()
        });

        for (id, outcome) in outcomes {
            apply_outcome(exec, &id, outcome);
        }
    }

    /// Run one step to completion, including retries.
    pub fn run_step(
        &self,
        step: &Step,
        dependencies: BTreeMap<StepId, Params>,
        ctx: &TraceContext,
    ) -> StepOutcome {
        let actor = actor_for(&step.capability_kind);
        let mut params = step.params.clone();
        let mut retries: u32 = 0;

        loop {
            let failure = match self.attempt(step, &params, &dependencies, ctx, &actor) {
                Ok(result) => {
                    let artifact_ids = self.persist_result(step, &result, ctx, &actor);
                    return StepOutcome::Succeeded { result, artifact_ids };
                }
                Err(failure) => failure,
            };

            let action = self.resolve_action(step, failure.kind);
            debug!(
                step_id = %step.id,
                kind = %failure.kind,
                action = %action,
                retries,
                "step failed"
            );

            match action {
                ErrorAction::Retry => {
                    if retries < self.config.max_retries {
                        let delay = self.config.backoff(retries);
                        retries += 1;
                        debug!(step_id = %step.id, retry = retries, delay_ms = delay.as_millis() as u64, "retrying step");
                        self.sleeper.sleep(delay);
                        continue;
                    }
                    warn!(step_id = %step.id, kind = %failure.kind, "retries exhausted");
                    return StepOutcome::Failed(record(step, &failure, action));
                }

                ErrorAction::Fallback => match failure.substitute_params {
                    Some(ref substitute) if retries < self.config.max_retries => {
                        retries += 1;
                        debug!(step_id = %step.id, retry = retries, "retrying step with substitute params");
                        for (key, value) in substitute {
                            params.insert(key.clone(), value.clone());
                        }
                        continue;
                    }
                    Some(_) => {
                        warn!(step_id = %step.id, kind = %failure.kind, "substitute retries exhausted");
                        return StepOutcome::Failed(record(step, &failure, action));
                    }
                    None => {
                        info!(step_id = %step.id, kind = %failure.kind, "step degraded to fallback");
                        return StepOutcome::Degraded {
                            result: marker(action),
                            action,
                            disambiguation_requested: false,
                        };
                    }
                },

                ErrorAction::AskUser => {
                    info!(step_id = %step.id, kind = %failure.kind, "step needs user input");
                    return StepOutcome::Degraded {
                        result: marker(action),
                        action,
                        disambiguation_requested: failure.needs_disambiguation,
                    };
                }

                ErrorAction::Abort => {
                    warn!(step_id = %step.id, kind = %failure.kind, message = %failure.message, "aborting plan");
                    return StepOutcome::Aborted(record(step, &failure, action));
                }
            }
        }
    }

    /// The step's own override wins over the table for every kind; a kind
    /// the table does not know aborts.
    fn resolve_action(&self, step: &Step, kind: ErrorKind) -> ErrorAction {
        step.on_error
            .or_else(|| self.policy.action_for(kind))
            .unwrap_or(ErrorAction::Abort)
    }

    /// One timed invocation wrapped in a span.
    fn attempt(
        &self,
        step: &Step,
        params: &Params,
        dependencies: &BTreeMap<StepId, Params>,
        ctx: &TraceContext,
        actor: &str,
    ) -> Result<Params, StepFailure> {
        let input = serde_json::Value::Object(params.clone()).to_string();
        let mut span = SpanGuard::enter(self.events.as_ref(), ctx, step.id.as_str(), actor, Some(input));

        let capability = match self.registry.require(&step.capability_kind) {
            Ok(capability) => capability,
            Err(e) => {
                let failure = StepFailure::new(ErrorKind::InvalidInput, e.to_string());
                span.fail(&failure);
                return Err(failure);
            }
        };

        let started = Instant::now();
        let result = capability.invoke(params, dependencies);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => {
                debug!(step_id = %step.id, elapsed_ms, "step succeeded");
                span.set_output(serde_json::Value::Object(output.clone()).to_string());
            }
            Err(failure) => span.fail(failure),
        }
        result
    }

    /// Persist a non-empty result as an artifact tagged with the step id.
    ///
    /// A failed write is logged and the step still succeeds without an
    /// artifact.
    fn persist_result(
        &self,
        step: &Step,
        result: &Params,
        ctx: &TraceContext,
        actor: &str,
    ) -> Vec<ArtifactId> {
        if result.is_empty() {
            return Vec::new();
        }

        let content = serde_json::Value::Object(result.clone());
        match self
            .artifacts
            .persist(&ctx.session_id, Some(&ctx.turn_id), step.id.as_str(), &content)
        {
            Ok(artifact_id) => {
                let event = TraceEvent::new(ctx, EventType::ArtifactCreated, actor, artifact_id.as_str())
                    .with_input(step.id.as_str());
                self.events.record(event);
                vec![artifact_id]
            }
            Err(e) => {
                warn!(step_id = %step.id, error = %e, "artifact persist failed");
                Vec::new()
            }
        }
    }
}

fn record(step: &Step, failure: &StepFailure, action: ErrorAction) -> RecordedError {
    RecordedError {
        id: step.id.clone(),
        kind: failure.kind,
        message: failure.message.clone(),
        action,
    }
}

/// Fold one step outcome into the plan-run state.
fn apply_outcome(exec: &mut ExecutionContext, id: &StepId, outcome: StepOutcome) {
    match outcome {
        StepOutcome::Succeeded { result, artifact_ids } => {
            exec.results.insert(id.clone(), result);
            if !artifact_ids.is_empty() {
                exec.artifacts.insert(id.clone(), artifact_ids);
            }
        }
        StepOutcome::Degraded {
            result,
            action,
            disambiguation_requested,
        } => {
            exec.results.insert(id.clone(), result);
            if action == ErrorAction::AskUser {
                exec.needs_disambiguation = true;
                exec.disambiguation_requested |= disambiguation_requested;
            }
        }
        StepOutcome::Failed(error) => exec.errors.push(error),
        StepOutcome::Aborted(error) => {
            exec.errors.push(error);
            exec.aborted = true;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
