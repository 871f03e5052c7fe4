//! # keel-policy
//!
//! The per-error-kind failure policy table for the KEEL runtime.
//!
//! ## Overview
//!
//! This crate provides [`PolicyTable`], which implements the
//! [`FailurePolicy`](keel_core::traits::FailurePolicy) trait. Every kind
//! starts at its default action; a TOML `[actions]` table may replace any of
//! them. A step's own `on_error` override is applied by the executor before
//! the table is consulted.
//!
//! | kind            | default action |
//! |-----------------|----------------|
//! | `permission`    | `ask_user`     |
//! | `not_found`     | `ask_user`     |
//! | `no_data`       | `fallback`     |
//! | `timeout`       | `retry`        |
//! | `rate_limit`    | `retry`        |
//! | `invalid_input` | `ask_user`     |
//! | `unknown`       | `abort`        |

pub mod table;

pub use table::PolicyTable;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use keel_contracts::{
        config::RuntimeConfig,
        error::KeelError,
        failure::{ErrorAction, ErrorKind},
    };
    use keel_core::traits::FailurePolicy;

    use crate::PolicyTable;

    // ── 1. defaults ───────────────────────────────────────────────────────────

    #[test]
    fn test_default_table_covers_every_kind() {
        let table = PolicyTable::default();
        for kind in ErrorKind::ALL {
            assert_eq!(table.action_for(kind), Some(kind.default_action()));
        }
    }

    // ── 2. TOML overrides ─────────────────────────────────────────────────────

    #[test]
    fn test_toml_override_replaces_single_kind() {
        let toml = r#"
            [actions]
            timeout = "abort"
            no_data = "ask_user"
        "#;

        let table = PolicyTable::from_toml_str(toml).unwrap();

        assert_eq!(table.action_for(ErrorKind::Timeout), Some(ErrorAction::Abort));
        assert_eq!(table.action_for(ErrorKind::NoData), Some(ErrorAction::AskUser));
        // Untouched kinds keep their defaults.
        assert_eq!(table.action_for(ErrorKind::RateLimit), Some(ErrorAction::Retry));
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(PolicyTable::from_toml_str("").unwrap(), PolicyTable::default());
    }

    #[test]
    fn test_overrides_from_runtime_config() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [policy.actions]
            permission = "abort"
        "#,
        )
        .unwrap();

        let table = PolicyTable::from_overrides(&config.policy).unwrap();
        assert_eq!(table.action_for(ErrorKind::Permission), Some(ErrorAction::Abort));
    }

    // ── 3. rejection ──────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_kind_is_rejected() {
        let toml = r#"
            [actions]
            cosmic_ray = "retry"
        "#;

        match PolicyTable::from_toml_str(toml) {
            Err(KeelError::ConfigError { reason }) => {
                assert!(reason.contains("cosmic_ray"), "unexpected reason: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let toml = r#"
            [actions]
            timeout = "panic"
        "#;

        match PolicyTable::from_toml_str(toml) {
            Err(KeelError::ConfigError { reason }) => {
                assert!(reason.contains("failed to parse policy TOML"), "unexpected reason: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    // ── 4. programmatic edits ─────────────────────────────────────────────────

    #[test]
    fn test_without_removes_entry() {
        let table = PolicyTable::default().without(ErrorKind::Timeout);
        assert_eq!(table.action_for(ErrorKind::Timeout), None);
        assert_eq!(table.action_for(ErrorKind::NotFound), Some(ErrorAction::AskUser));
    }

    #[test]
    fn test_set_replaces_entry() {
        let table = PolicyTable::default().set(ErrorKind::Unknown, ErrorAction::Fallback);
        assert_eq!(table.get(ErrorKind::Unknown), Some(ErrorAction::Fallback));
    }
}
