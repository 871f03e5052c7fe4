//! # keel-trace
//!
//! Bounded, append-only trace event recorder for the KEEL runtime.
//!
//! ## Overview
//!
//! Every event carries the session, turn, and span ids of the
//! `TraceContext` it was recorded in, so the events of one turn form a span
//! tree. The store is a ring buffer: once it holds more than its capacity,
//! the oldest half is dropped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keel_trace::{EventStore, Tracer};
//!
//! let tracer = Tracer::new(Arc::new(EventStore::new(10_000)));
//! let root = TraceContext::new(session_id, turn_id);
//! let answer = tracer.in_span(&root, "answer", "responder", |ctx| compose(ctx))?;
//! let tree = tracer.store().span_tree(&root.turn_id);
//! ```

pub mod store;
pub mod tracer;

pub use store::{EventStore, SpanNode};
pub use tracer::Tracer;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keel_contracts::{
        event::{EventType, TraceContext, TraceEvent},
        ids::{SessionId, TurnId},
    };
    use keel_core::traits::EventSink;

    use super::{EventStore, Tracer};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn root(turn: &str) -> TraceContext {
        TraceContext::new(SessionId::from("session"), TurnId::from(turn))
    }

    fn custom(ctx: &TraceContext, n: usize) -> TraceEvent {
        TraceEvent::new(ctx, EventType::Custom("tick".to_string()), "tester", format!("e{n}"))
    }

    // ── Ring buffer ───────────────────────────────────────────────────────────

    /// Appends under capacity keep everything in order.
    #[test]
    fn test_append_preserves_order() {
        let store = EventStore::new(10);
        let ctx = root("t");
        for n in 0..5 {
            store.record(custom(&ctx, n));
        }

        let names: Vec<String> = store.events().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["e0", "e1", "e2", "e3", "e4"]);
    }

    /// Exceeding capacity drops the oldest half in one step.
    #[test]
    fn test_overflow_drops_oldest_half() {
        let store = EventStore::new(10);
        let ctx = root("t");
        for n in 0..11 {
            store.record(custom(&ctx, n));
        }

        let events = store.events();
        assert_eq!(events.len(), 6, "11 events over a cap of 10 keeps the newest 6");
        assert_eq!(events[0].name, "e5");
        assert_eq!(events.last().unwrap().name, "e10");
    }

    /// The store never exceeds its capacity however many events arrive.
    #[test]
    fn test_bounded_under_sustained_load() {
        let store = EventStore::new(100);
        let ctx = root("t");
        for n in 0..1_000 {
            store.record(custom(&ctx, n));
            assert!(store.len() <= store.capacity());
        }
        assert_eq!(store.events().last().unwrap().name, "e999");
    }

    #[test]
    fn test_filters_by_turn_and_session() {
        let store = EventStore::new(100);
        store.record(custom(&root("t1"), 0));
        store.record(custom(&root("t2"), 1));
        store.record(custom(&root("t1"), 2));

        assert_eq!(store.events_for_turn(&TurnId::from("t1")).len(), 2);
        assert_eq!(store.events_for_session(&SessionId::from("session")).len(), 3);
        assert!(store.events_for_session(&SessionId::from("other")).is_empty());

        store.clear();
        assert!(store.is_empty());
    }

    // ── Spans ─────────────────────────────────────────────────────────────────

    /// Nested spans rebuild into a tree; siblings keep their start order.
    #[test]
    fn test_span_tree_reconstruction() {
        let tracer = Tracer::new(Arc::new(EventStore::new(1_000)));
        let ctx = root("turn-tree");

        let result: Result<(), String> = tracer.in_span(&ctx, "plan", "executor", |plan| {
            tracer.in_span(plan, "fetch", "fetch_agent", |_| Ok::<_, String>(()))?;
            tracer.in_span(plan, "score", "score_agent", |score| {
                let _leaf = tracer.span(score, "llm", "llm_client");
                Err("model overloaded".to_string())
            })
        });
        assert!(result.is_err());

        let tree = tracer.store().span_tree(&TurnId::from("turn-tree"));
        assert_eq!(tree.len(), 1);
        let plan = &tree[0];
        assert_eq!(plan.name, "plan");
        assert_eq!(plan.size(), 4);
        assert!(plan.failed);

        let names: Vec<&str> = plan.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "score"]);
        assert!(!plan.children[0].failed);
        assert!(plan.children[1].failed);
        assert_eq!(plan.children[1].children[0].name, "llm");
        assert!(plan.children[1].children[0].duration_ms.is_some());
    }

    /// A span whose parent was pruned away surfaces as a root.
    #[test]
    fn test_orphaned_span_becomes_root() {
        let store = Arc::new(EventStore::new(4));
        let tracer = Tracer::new(store.clone());
        let ctx = root("turn-orphan");

        let outer = tracer.span(&ctx, "outer", "tester");
        // Push the outer span's start event out of the buffer.
        for n in 0..4 {
            store.record(custom(outer.ctx(), n));
        }
        {
            let _inner = tracer.span(outer.ctx(), "inner", "tester");
        }
        drop(outer);

        let tree = store.span_tree(&TurnId::from("turn-orphan"));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "inner");
    }

    #[test]
    fn test_emit_records_in_context() {
        let tracer = Tracer::default();
        let ctx = root("t");
        tracer.emit(&ctx, EventType::ArtifactCreated, "fetch_agent", "fetch_abc");

        let events = tracer.store().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ArtifactCreated);
        assert_eq!(events[0].turn_id, TurnId::from("t"));
    }

    /// Many threads recording at once lose nothing under capacity.
    #[test]
    fn test_concurrent_recording() {
        let store = Arc::new(EventStore::new(10_000));
        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    let ctx = root(&format!("t{t}"));
                    for n in 0..100 {
                        store.record(custom(&ctx, n));
                    }
                });
            }
        });
        assert_eq!(store.len(), 800);
    }
}
