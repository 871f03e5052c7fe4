//! Step failure taxonomy.
//!
//! Every step failure is classified into exactly one `ErrorKind`. The policy
//! table maps kinds to an `ErrorAction`; a step may override the table with a
//! single blanket action of its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::Params;

/// The closed set of failure kinds a capability can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    NotFound,
    NoData,
    Timeout,
    RateLimit,
    InvalidInput,
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Permission,
        ErrorKind::NotFound,
        ErrorKind::NoData,
        ErrorKind::Timeout,
        ErrorKind::RateLimit,
        ErrorKind::InvalidInput,
        ErrorKind::Unknown,
    ];

    /// The action applied when neither the step nor a customised table says
    /// otherwise.
    pub fn default_action(self) -> ErrorAction {
        match self {
            ErrorKind::Permission => ErrorAction::AskUser,
            ErrorKind::NotFound => ErrorAction::AskUser,
            ErrorKind::NoData => ErrorAction::Fallback,
            ErrorKind::Timeout => ErrorAction::Retry,
            ErrorKind::RateLimit => ErrorAction::Retry,
            ErrorKind::InvalidInput => ErrorAction::AskUser,
            ErrorKind::Unknown => ErrorAction::Abort,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoData => "no_data",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Classify a free-form error code or message.
    ///
    /// Upstream collaborators (HTTP clients, the GitHub source, model
    /// clients) report failures as status codes or prose; this maps the
    /// common shapes onto the taxonomy. Anything unrecognised is `Unknown`.
    pub fn classify(raw: &str) -> ErrorKind {
        let text = raw.trim().to_ascii_lowercase();
        if let Ok(kind) = text.parse::<ErrorKind>() {
            return kind;
        }

        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if has(&["401", "403", "permission", "forbidden", "unauthorized", "access denied"]) {
            ErrorKind::Permission
        } else if has(&["429", "rate limit", "rate_limit", "too many requests"]) {
            ErrorKind::RateLimit
        } else if has(&["timeout", "timed out", "deadline exceeded", "504"]) {
            ErrorKind::Timeout
        } else if has(&["404", "not found", "not_found", "no such"]) {
            ErrorKind::NotFound
        } else if has(&["no data", "no_data", "empty result", "nothing to"]) {
            ErrorKind::NoData
        } else if has(&["400", "422", "invalid", "malformed", "missing parameter"]) {
            ErrorKind::InvalidInput
        } else {
            ErrorKind::Unknown
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown error kind '{s}'"))
    }
}

/// How the executor reacts to a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Sleep with backoff and run the same step again.
    Retry,
    /// Retry with substitute params, or degrade to a `fallback` marker.
    Fallback,
    /// Degrade to an `ask_user` marker and flag the plan for disambiguation.
    AskUser,
    /// Stop scheduling further steps.
    Abort,
}

impl ErrorAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorAction::Retry => "retry",
            ErrorAction::Fallback => "fallback",
            ErrorAction::AskUser => "ask_user",
            ErrorAction::Abort => "abort",
        }
    }
}

impl fmt::Display for ErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure returned by a capability.
///
/// `substitute_params` is only meaningful under `Fallback`: when present the
/// executor merges it into the step's params and tries again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub substitute_params: Option<Params>,
    /// Set by capabilities that cannot proceed without a user decision
    /// (e.g. an ambiguous repository name). Surfaces as plan status
    /// `disambiguation`.
    #[serde(default)]
    pub needs_disambiguation: bool,
}

impl StepFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            substitute_params: None,
            needs_disambiguation: false,
        }
    }

    /// Build a failure by classifying a raw upstream error string.
    pub fn classified(raw: impl Into<String>) -> Self {
        let message = raw.into();
        Self::new(ErrorKind::classify(&message), message)
    }

    /// Attach params to merge into the step before the next attempt.
    pub fn with_substitute(mut self, params: Params) -> Self {
        self.substitute_params = Some(params);
        self
    }

    /// Mark this failure as an explicit request for user clarification.
    pub fn disambiguate(mut self) -> Self {
        self.needs_disambiguation = true;
        self
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StepFailure {}
