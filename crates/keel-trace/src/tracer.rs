//! A cloneable handle over a shared `EventStore`.
//!
//! The composition root builds one `Tracer` and hands clones (or its
//! `sink()`) to the executor and any other component that records events.

use std::fmt::Display;
use std::sync::Arc;

use keel_contracts::event::{EventType, TraceContext, TraceEvent};
use keel_core::{span, traits::EventSink, SpanGuard};

use crate::store::EventStore;

#[derive(Debug, Clone, Default)]
pub struct Tracer {
    store: Arc<EventStore>,
}

impl Tracer {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The store as a trait object, for `Executor::new`.
    pub fn sink(&self) -> Arc<dyn EventSink> {
        self.store.clone()
    }

    /// Open a span nested inside `parent`; it finishes when the guard drops.
    pub fn span(&self, parent: &TraceContext, name: &str, actor: &str) -> SpanGuard<'_> {
        SpanGuard::enter(self.store.as_ref(), parent, name, actor, None)
    }

    /// Run `body` inside a span, recording an error event if it fails.
    pub fn in_span<T, E, F>(&self, parent: &TraceContext, name: &str, actor: &str, body: F) -> Result<T, E>
    where
        E: Display,
        F: FnOnce(&TraceContext) -> Result<T, E>,
    {
        span::in_span(self.store.as_ref(), parent, name, actor, body)
    }

    /// Record a single instantaneous event in `ctx`.
    pub fn emit(&self, ctx: &TraceContext, event_type: EventType, actor: &str, name: &str) {
        self.store.record(TraceEvent::new(ctx, event_type, actor, name));
    }
}
