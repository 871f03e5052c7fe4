//! Scoped spans over an `EventSink`.
//!
//! Entering a span mints a span id, derives a child `TraceContext` whose
//! parent is the caller's span, and records `SpanStarted`. Dropping the
//! guard records `SpanFinished` with the elapsed duration, preceded by
//! `SpanError` if the body failed or the thread is unwinding. The caller's
//! own context is never touched, so it is still the enclosing span once the
//! guard is gone.

use std::fmt::Display;
use std::time::Instant;

use chrono::{DateTime, Utc};

use keel_contracts::{
    event::{summarize, EventType, TraceContext, TraceEvent},
    ids::SpanId,
};

use crate::traits::EventSink;

/// Longest input/output summary kept on an event.
pub const SUMMARY_LIMIT: usize = 200;

/// An open span. Finishes when dropped.
pub struct SpanGuard<'a> {
    sink: &'a dyn EventSink,
    ctx: TraceContext,
    name: String,
    actor: String,
    started_at: DateTime<Utc>,
    start: Instant,
    output: Option<String>,
    error: Option<String>,
}

impl<'a> SpanGuard<'a> {
    /// Open a span nested inside `parent`.
    pub fn enter(
        sink: &'a dyn EventSink,
        parent: &TraceContext,
        name: impl Into<String>,
        actor: impl Into<String>,
        input: Option<String>,
    ) -> Self {
        let ctx = parent.child(SpanId::generate());
        let name = name.into();
        let actor = actor.into();

        let mut started = TraceEvent::new(&ctx, EventType::SpanStarted, &actor, &name);
        if let Some(input) = input {
            started = started.with_input(summarize(&input, SUMMARY_LIMIT));
        }
        let started_at = started.started_at;
        sink.record(started);

        Self {
            sink,
            ctx,
            name,
            actor,
            started_at,
            start: Instant::now(),
            output: None,
            error: None,
        }
    }

    /// The context of this span, to pass to nested operations.
    pub fn ctx(&self) -> &TraceContext {
        &self.ctx
    }

    /// Attach an output summary to the finish event.
    pub fn set_output(&mut self, output: impl AsRef<str>) {
        self.output = Some(summarize(output.as_ref(), SUMMARY_LIMIT));
    }

    /// Mark the span as failed; an error event precedes the finish event.
    pub fn fail(&mut self, error: impl Display) {
        self.error = Some(summarize(&error.to_string(), SUMMARY_LIMIT));
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        if self.error.is_none() && std::thread::panicking() {
            self.error = Some("panicked".to_string());
        }

        if let Some(error) = self.error.take() {
            let event = TraceEvent::new(&self.ctx, EventType::SpanError, &self.actor, &self.name)
                .with_output(error);
            self.sink.record(event);
        }

        let elapsed = self.start.elapsed().as_millis() as u64;
        let mut finished =
            TraceEvent::new(&self.ctx, EventType::SpanFinished, &self.actor, &self.name)
                .finished(self.started_at, elapsed);
        if let Some(output) = self.output.take() {
            finished = finished.with_output(output);
        }
        self.sink.record(finished);
    }
}

/// Run `body` inside a span, recording an error event if it returns `Err`.
pub fn in_span<T, E, F>(
    sink: &dyn EventSink,
    parent: &TraceContext,
    name: &str,
    actor: &str,
    body: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce(&TraceContext) -> Result<T, E>,
{
    let mut guard = SpanGuard::enter(sink, parent, name, actor, None);
    let result = body(guard.ctx());
    if let Err(e) = &result {
        guard.fail(e);
    }
    result
}
