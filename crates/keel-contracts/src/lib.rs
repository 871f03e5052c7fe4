//! # keel-contracts
//!
//! Shared types, error taxonomy, and configuration for the KEEL runtime.
//!
//! All crates in the workspace import from here. No execution logic lives in
//! this crate: only data definitions, the failure taxonomy, and config.

pub mod artifact;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod failure;
pub mod ids;
pub mod memory;
pub mod plan;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use config::RuntimeConfig;
    use error::KeelError;
    use event::TraceContext;
    use execution::{ExecutionContext, ExecutionStatus, RecordedError};
    use failure::{ErrorAction, ErrorKind, StepFailure};
    use ids::{SessionId, SpanId, StepId, TurnId};
    use plan::{Plan, Step};

    // ── Error taxonomy ───────────────────────────────────────────────────────

    #[test]
    fn default_actions_match_policy_table() {
        let expected = [
            (ErrorKind::Permission, ErrorAction::AskUser),
            (ErrorKind::NotFound, ErrorAction::AskUser),
            (ErrorKind::NoData, ErrorAction::Fallback),
            (ErrorKind::Timeout, ErrorAction::Retry),
            (ErrorKind::RateLimit, ErrorAction::Retry),
            (ErrorKind::InvalidInput, ErrorAction::AskUser),
            (ErrorKind::Unknown, ErrorAction::Abort),
        ];
        for (kind, action) in expected {
            assert_eq!(kind.default_action(), action, "default for {kind}");
        }
    }

    #[test]
    fn classify_common_upstream_errors() {
        assert_eq!(ErrorKind::classify("HTTP 403 Forbidden"), ErrorKind::Permission);
        assert_eq!(ErrorKind::classify("repository not found"), ErrorKind::NotFound);
        assert_eq!(ErrorKind::classify("request timed out after 30s"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("429 Too Many Requests"), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::classify("no data for that range"), ErrorKind::NoData);
        assert_eq!(ErrorKind::classify("malformed owner/repo"), ErrorKind::InvalidInput);
        assert_eq!(ErrorKind::classify("rate_limit"), ErrorKind::RateLimit);
    }

    #[test]
    fn classify_unrecognised_is_unknown() {
        assert_eq!(ErrorKind::classify("segfault in the flux capacitor"), ErrorKind::Unknown);
        assert_eq!(ErrorKind::classify(""), ErrorKind::Unknown);
    }

    #[test]
    fn error_kind_parses_its_own_names() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("timeouts".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn step_failure_builders() {
        let mut params = plan::Params::new();
        params.insert("branch".to_string(), serde_json::json!("main"));

        let failure = StepFailure::new(ErrorKind::NoData, "empty branch")
            .with_substitute(params.clone())
            .disambiguate();

        assert_eq!(failure.substitute_params, Some(params));
        assert!(failure.needs_disambiguation);
        assert_eq!(failure.to_string(), "no_data: empty branch");
    }

    // ── Plan ─────────────────────────────────────────────────────────────────

    #[test]
    fn plan_deserializes_from_planner_json() {
        let json = serde_json::json!([
            { "id": "fetch", "capability_kind": "fetch_repo", "params": { "repo": "a/b" } },
            { "id": "score", "capability_kind": "score", "needs": ["fetch"], "on_error": "abort" }
        ]);
        let plan: Plan = serde_json::from_value(json).unwrap();

        assert_eq!(plan.len(), 2);
        let score = plan.get(&StepId::from("score")).unwrap();
        assert_eq!(score.needs, vec![StepId::from("fetch")]);
        assert_eq!(score.on_error, Some(ErrorAction::Abort));
        assert!(plan.get(&StepId::from("fetch")).unwrap().on_error.is_none());
    }

    #[test]
    fn step_builder_accumulates() {
        let step = Step::new("b", "analyze")
            .needs("a")
            .param("depth", serde_json::json!(2))
            .on_error(ErrorAction::Fallback);

        assert_eq!(step.needs.len(), 1);
        assert_eq!(step.params["depth"], serde_json::json!(2));
        assert_eq!(step.on_error, Some(ErrorAction::Fallback));
    }

    // ── ExecutionContext status precedence ───────────────────────────────────

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(SessionId::from("s"), TurnId::from("t"))
    }

    fn recorded() -> RecordedError {
        RecordedError {
            id: StepId::from("x"),
            kind: ErrorKind::Timeout,
            message: "slow".to_string(),
            action: ErrorAction::Retry,
        }
    }

    #[test]
    fn status_precedence() {
        let mut c = ctx();
        assert_eq!(c.status(), ExecutionStatus::Completed);

        c.errors.push(recorded());
        assert_eq!(c.status(), ExecutionStatus::Partial);

        c.disambiguation_requested = true;
        assert_eq!(c.status(), ExecutionStatus::Disambiguation);

        c.aborted = true;
        assert_eq!(c.status(), ExecutionStatus::Aborted);
    }

    #[test]
    fn ask_user_flag_alone_keeps_completed() {
        let mut c = ctx();
        c.needs_disambiguation = true;
        assert_eq!(c.status(), ExecutionStatus::Completed);

        let report = c.into_report();
        assert!(report.needs_disambiguation);
        assert_eq!(report.status, ExecutionStatus::Completed);
    }

    #[test]
    fn dependency_results_skip_missing_ids() {
        let mut c = ctx();
        c.results.insert(StepId::from("a"), plan::Params::new());

        let deps = c.dependency_results(&[StepId::from("a"), StepId::from("ghost")]);
        assert_eq!(deps.len(), 1);
        assert!(deps.contains_key(&StepId::from("a")));
    }

    #[test]
    fn report_serializes_status_snake_case() {
        let report = ctx().into_report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json["errors"].as_array().unwrap().is_empty());
    }

    // ── TraceContext ─────────────────────────────────────────────────────────

    #[test]
    fn child_context_links_parent() {
        let root = TraceContext::new(SessionId::from("s"), TurnId::from("t"));
        let outer = root.child(SpanId::from("outer"));
        let inner = outer.child(SpanId::from("inner"));

        assert_eq!(outer.parent_span_id, None);
        assert_eq!(inner.parent_span_id, Some(SpanId::from("outer")));
        assert_eq!(inner.span_id, Some(SpanId::from("inner")));
        assert_eq!(inner.turn_id, root.turn_id);
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| SpanId::generate().0).collect();
        assert_eq!(ids.len(), 100);
    }

    // ── Config ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_config_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.executor.max_retries, 2);
        assert_eq!(config.memory.max_turns, 20);
        assert!(config.idempotency.enabled);
    }

    #[test]
    fn config_sections_override_defaults() {
        let toml = r#"
            [executor]
            max_retries = 4
            parallel_levels = true

            [policy.actions]
            timeout = "abort"

            [memory]
            connection = ":memory:"
            max_turns = 5
        "#;
        let config = RuntimeConfig::from_toml_str(toml).unwrap();

        assert_eq!(config.executor.max_retries, 4);
        assert!(config.executor.parallel_levels);
        assert_eq!(config.executor.backoff_base_ms, 500);
        assert_eq!(config.policy.actions.get("timeout"), Some(&ErrorAction::Abort));
        assert_eq!(config.memory.connection.as_deref(), Some(":memory:"));
        assert_eq!(config.memory.max_turns, 5);
    }

    #[test]
    fn backoff_grows_geometrically() {
        let config = config::ExecutorConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(1), Duration::from_millis(750));
        assert_eq!(config.backoff(2), Duration::from_millis(1125));
    }

    #[test]
    fn malformed_config_is_config_error() {
        match RuntimeConfig::from_toml_str("[executor\nmax_retries = ") {
            Err(KeelError::ConfigError { reason }) => {
                assert!(reason.contains("failed to parse runtime config TOML"));
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn error_display_messages() {
        let err = KeelError::CapabilityNotRegistered { kind: "summarize".to_string() };
        assert!(err.to_string().contains("summarize"));

        let err = KeelError::LockPoisoned { resource: "artifact store".to_string() };
        assert!(err.to_string().contains("artifact store"));
    }
}
