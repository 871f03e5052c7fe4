//! In-memory, bounded implementation of `EventSink`.
//!
//! `EventStore` keeps events in a `VecDeque` behind a `Mutex`, making it safe
//! to share across the scoped threads of a parallel level. When an append
//! takes the buffer past its capacity, the oldest half is dropped in one go.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use keel_contracts::{
    config::TraceConfig,
    event::{EventType, TraceEvent},
    ids::{SessionId, SpanId, TurnId},
};
use keel_core::traits::EventSink;

// ── Span tree ─────────────────────────────────────────────────────────────────

/// One span reconstructed from its start/finish/error events.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanNode {
    pub span_id: SpanId,
    pub name: String,
    pub actor: String,
    pub duration_ms: Option<u64>,
    pub failed: bool,
    pub children: Vec<SpanNode>,
}

impl SpanNode {
    /// Total number of spans in this subtree, including this one.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(SpanNode::size).sum::<usize>()
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An append-only ring buffer of trace events.
///
/// # Thread safety
///
/// Every method takes the internal lock. A poisoned lock is recovered rather
/// than propagated: the buffer only ever holds fully-formed events.
#[derive(Debug)]
pub struct EventStore {
    capacity: usize,
    events: Mutex<VecDeque<TraceEvent>>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::from_config(&TraceConfig::default())
    }
}

impl EventStore {
    /// Create a store holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn from_config(config: &TraceConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TraceEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Every retained event, oldest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn events_for_session(&self, session_id: &SessionId) -> Vec<TraceEvent> {
        self.lock()
            .iter()
            .filter(|e| &e.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn events_for_turn(&self, turn_id: &TurnId) -> Vec<TraceEvent> {
        self.lock()
            .iter()
            .filter(|e| &e.turn_id == turn_id)
            .cloned()
            .collect()
    }

    /// Rebuild the span tree of one turn from its retained events.
    ///
    /// Spans whose parent was pruned (or never recorded) become roots.
    /// Siblings keep the order in which they started.
    pub fn span_tree(&self, turn_id: &TurnId) -> Vec<SpanNode> {
        let events = self.events_for_turn(turn_id);

        let mut order: Vec<SpanId> = Vec::new();
        let mut nodes: HashMap<SpanId, (Option<SpanId>, SpanNode)> = HashMap::new();

        for event in &events {
            let Some(span_id) = &event.span_id else { continue };
            match event.event_type {
                EventType::SpanStarted => {
                    order.push(span_id.clone());
                    nodes.insert(
                        span_id.clone(),
                        (
                            event.parent_span_id.clone(),
                            SpanNode {
                                span_id: span_id.clone(),
                                name: event.name.clone(),
                                actor: event.actor.clone(),
                                duration_ms: None,
                                failed: false,
                                children: Vec::new(),
                            },
                        ),
                    );
                }
                EventType::SpanFinished => {
                    if let Some((_, node)) = nodes.get_mut(span_id) {
                        node.duration_ms = event.duration_ms;
                    }
                }
                EventType::SpanError => {
                    if let Some((_, node)) = nodes.get_mut(span_id) {
                        node.failed = true;
                    }
                }
                _ => {}
            }
        }

        let mut children: HashMap<Option<SpanId>, Vec<SpanId>> = HashMap::new();
        for span_id in &order {
            let parent = nodes[span_id]
                .0
                .clone()
                .filter(|parent| nodes.contains_key(parent));
            children.entry(parent).or_default().push(span_id.clone());
        }

        fn build(
            id: &SpanId,
            nodes: &mut HashMap<SpanId, (Option<SpanId>, SpanNode)>,
            children: &HashMap<Option<SpanId>, Vec<SpanId>>,
        ) -> Option<SpanNode> {
            let (_, mut node) = nodes.remove(id)?;
            if let Some(kids) = children.get(&Some(id.clone())) {
                node.children = kids.iter().filter_map(|k| build(k, nodes, children)).collect();
            }
            Some(node)
        }

        children
            .get(&None)
            .map(|roots| {
                roots
                    .iter()
                    .filter_map(|root| build(root, &mut nodes, &children))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── EventSink impl ────────────────────────────────────────────────────────────

impl EventSink for EventStore {
    /// Append one event, dropping the oldest half when over capacity.
    fn record(&self, event: TraceEvent) {
        debug!(
            event_type = ?event.event_type,
            actor = %event.actor,
            name = %event.name,
            session_id = %event.session_id,
            turn_id = %event.turn_id,
            duration_ms = ?event.duration_ms,
            "trace event"
        );

        let mut events = self.lock();
        events.push_back(event);
        if events.len() > self.capacity {
            let dropped = events.len() / 2;
            events.drain(..dropped);
            debug!(dropped, retained = events.len(), "event store pruned");
        }
    }
}
