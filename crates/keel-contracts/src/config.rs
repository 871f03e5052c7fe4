//! Runtime configuration.
//!
//! Every section is optional in TOML; missing sections and fields take their
//! defaults. Durations are written as integer milliseconds or seconds, as
//! named by the field.
//!
//! ```toml
//! [executor]
//! max_retries = 2
//! backoff_base_ms = 500
//! backoff_factor = 1.5
//! parallel_levels = true
//!
//! [policy.actions]
//! timeout = "abort"
//!
//! [trace]
//! capacity = 10000
//!
//! [artifacts]
//! max_per_session = 500
//!
//! [idempotency]
//! ttl_secs = 3600
//! enabled = true
//!
//! [memory]
//! connection = "/var/lib/keel/memory.db"
//! turn_ttl_secs = 86400
//! summary_ttl_secs = 604800
//! max_turns = 20
//! max_sessions = 1000
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{KeelError, KeelResult},
    failure::ErrorAction,
};

/// Retry and scheduling knobs for the plan executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Plan-wide cap on retries per step. A step runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    /// Run the steps of a level on scoped threads instead of one by one.
    pub parallel_levels: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_ms: 500,
            backoff_factor: 1.5,
            parallel_levels: false,
        }
    }
}

impl ExecutorConfig {
    /// Delay before retry number `attempt` (0-based): `base × factor^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let millis = self.backoff_base_ms as f64 * self.backoff_factor.powi(attempt as i32);
        Duration::from_millis(millis.round() as u64)
    }
}

/// Per-kind overrides of the default failure actions, keyed by kind name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub actions: BTreeMap<String, ErrorAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum events retained before the oldest half is dropped.
    pub capacity: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Optional bound on artifacts kept per session. Unbounded when absent.
    pub max_per_session: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub ttl_secs: u64,
    /// When false every lookup misses and nothing is stored.
    pub enabled: bool,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            enabled: true,
        }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Durable backend connection string (a SQLite path or `:memory:`).
    /// Absent means in-memory only.
    pub connection: Option<String>,
    pub turn_ttl_secs: u64,
    pub summary_ttl_secs: u64,
    /// Maximum turns retained per session; older turns are evicted.
    pub max_turns: usize,
    /// Maximum sessions tracked by the in-memory backend.
    pub max_sessions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            connection: None,
            turn_ttl_secs: 24 * 60 * 60,
            summary_ttl_secs: 7 * 24 * 60 * 60,
            max_turns: 20,
            max_sessions: 1000,
        }
    }
}

impl MemoryConfig {
    pub fn turn_ttl(&self) -> Duration {
        Duration::from_secs(self.turn_ttl_secs)
    }

    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_ttl_secs)
    }
}

/// The top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub executor: ExecutorConfig,
    pub policy: PolicyOverrides,
    pub trace: TraceConfig,
    pub artifacts: ArtifactConfig,
    pub idempotency: IdempotencyConfig,
    pub memory: MemoryConfig,
}

impl RuntimeConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `KeelError::ConfigError` if the document is malformed or a
    /// field has the wrong type.
    pub fn from_toml_str(s: &str) -> KeelResult<Self> {
        toml::from_str(s).map_err(|e| KeelError::ConfigError {
            reason: format!("failed to parse runtime config TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as TOML.
    pub fn from_file(path: &Path) -> KeelResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| KeelError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
