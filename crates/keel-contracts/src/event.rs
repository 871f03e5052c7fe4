//! Trace events and the context that ties them into a span tree.
//!
//! A `TraceContext` is passed explicitly through every call that records
//! events. Entering a span produces a child context; the caller's own
//! context value is never modified, so the enclosing span is restored simply
//! by continuing to use it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, SpanId, TurnId};

/// Session, turn, and span ids for the current operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    /// The span currently executing, if any.
    pub span_id: Option<SpanId>,
    /// The span that encloses `span_id`.
    pub parent_span_id: Option<SpanId>,
}

impl TraceContext {
    /// A root context with no open span.
    pub fn new(session_id: SessionId, turn_id: TurnId) -> Self {
        Self {
            session_id,
            turn_id,
            span_id: None,
            parent_span_id: None,
        }
    }

    /// Derive the context for a new span nested inside this one.
    pub fn child(&self, span_id: SpanId) -> Self {
        Self {
            session_id: self.session_id.clone(),
            turn_id: self.turn_id.clone(),
            parent_span_id: self.span_id.clone(),
            span_id: Some(span_id),
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SpanStarted,
    SpanFinished,
    /// Emitted just before `SpanFinished` when the span's body failed.
    SpanError,
    ArtifactCreated,
    /// Free-form event type emitted by callers.
    Custom(String),
}

/// One entry in the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_type: EventType,
    /// Logical emitter, e.g. `"fetch_repo_agent"` or `"executor"`.
    pub actor: String,
    /// Operation name (span name, step id, artifact id).
    pub name: String,
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub span_id: Option<SpanId>,
    pub parent_span_id: Option<SpanId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub input_summary: Option<String>,
    #[serde(default)]
    pub output_summary: Option<String>,
}

impl TraceEvent {
    /// An instantaneous event stamped with the ids from `ctx`.
    pub fn new(
        ctx: &TraceContext,
        event_type: EventType,
        actor: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            actor: actor.into(),
            name: name.into(),
            session_id: ctx.session_id.clone(),
            turn_id: ctx.turn_id.clone(),
            span_id: ctx.span_id.clone(),
            parent_span_id: ctx.parent_span_id.clone(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            input_summary: None,
            output_summary: None,
        }
    }

    pub fn with_input(mut self, summary: impl Into<String>) -> Self {
        self.input_summary = Some(summary.into());
        self
    }

    pub fn with_output(mut self, summary: impl Into<String>) -> Self {
        self.output_summary = Some(summary.into());
        self
    }

    /// Stamp a finish time and the elapsed duration since `started_at`.
    pub fn finished(mut self, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        self.started_at = started_at;
        self.finished_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Clip a string to at most `max` characters for event summaries.
pub fn summarize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max).collect();
        clipped.push('…');
        clipped
    }
}
