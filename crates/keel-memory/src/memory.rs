//! `ConversationMemory`: the facade callers talk to.
//!
//! It routes to the durable backend when one is configured and available,
//! and to the in-memory backend otherwise. A durable operation that errors
//! is logged and retried against the in-memory backend, so callers get
//! plain values and never branch on storage state.

use std::collections::BTreeMap;

use tracing::warn;

use keel_contracts::{
    config::MemoryConfig,
    error::KeelResult,
    ids::SessionId,
    memory::{ConversationContext, ConversationTurn},
};

use crate::{backend::MemoryBackend, in_memory::InMemoryBackend, sqlite::SqliteBackend};

pub struct ConversationMemory {
    durable: Option<Box<dyn MemoryBackend>>,
    fallback: InMemoryBackend,
    max_turns: usize,
}

impl std::fmt::Debug for ConversationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationMemory")
            .field("backend", &self.backend_name())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::in_memory(&MemoryConfig::default())
    }
}

impl ConversationMemory {
    /// Build from config: SQLite when `connection` is set, in-memory
    /// otherwise.
    pub fn from_config(config: &MemoryConfig) -> Self {
        match &config.connection {
            Some(connection) => {
                Self::with_durable(Box::new(SqliteBackend::connect(connection, config)), config)
            }
            None => Self::in_memory(config),
        }
    }

    pub fn in_memory(config: &MemoryConfig) -> Self {
        Self {
            durable: None,
            fallback: InMemoryBackend::new(config),
            max_turns: config.max_turns,
        }
    }

    /// Use `durable` as the preferred backend.
    pub fn with_durable(durable: Box<dyn MemoryBackend>, config: &MemoryConfig) -> Self {
        Self {
            durable: Some(durable),
            fallback: InMemoryBackend::new(config),
            max_turns: config.max_turns,
        }
    }

    /// Name of the backend currently serving requests.
    pub fn backend_name(&self) -> &'static str {
        match self.active_durable() {
            Some(durable) => durable.name(),
            None => self.fallback.name(),
        }
    }

    fn active_durable(&self) -> Option<&dyn MemoryBackend> {
        self.durable.as_deref().filter(|b| b.is_available())
    }

    fn dispatch<T: Default>(
        &self,
        operation: &str,
        session_id: &SessionId,
        call: impl Fn(&dyn MemoryBackend) -> KeelResult<T>,
    ) -> T {
        if let Some(durable) = self.active_durable() {
            match call(durable) {
                Ok(value) => return value,
                Err(e) => warn!(
                    operation,
                    session_id = %session_id,
                    backend = durable.name(),
                    error = %e,
                    "durable memory failed; using in-memory backend"
                ),
            }
        }

        call(&self.fallback).unwrap_or_else(|e| {
            warn!(operation, session_id = %session_id, error = %e, "memory operation failed");
            T::default()
        })
    }

    pub fn add_turn(&self, session_id: &SessionId, turn: ConversationTurn) {
        self.dispatch("add_turn", session_id, |b| b.add_turn(session_id, &turn))
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, session_id: &SessionId, n: usize) -> Vec<ConversationTurn> {
        self.dispatch("recent_turns", session_id, |b| b.recent_turns(session_id, n))
    }

    /// Everything remembered for the session, up to `max_turns` turns.
    pub fn context(&self, session_id: &SessionId) -> ConversationContext {
        ConversationContext {
            turns: self.recent_turns(session_id, self.max_turns),
            summary: self.summary(session_id),
            preferences: self.preferences(session_id),
        }
    }

    pub fn set_summary(&self, session_id: &SessionId, summary: &str) {
        self.dispatch("set_summary", session_id, |b| b.set_summary(session_id, summary))
    }

    pub fn summary(&self, session_id: &SessionId) -> Option<String> {
        self.dispatch("summary", session_id, |b| b.summary(session_id))
    }

    pub fn set_preference(&self, session_id: &SessionId, key: &str, value: &str) {
        self.dispatch("set_preference", session_id, |b| {
            b.set_preference(session_id, key, value)
        })
    }

    pub fn preferences(&self, session_id: &SessionId) -> BTreeMap<String, String> {
        self.dispatch("preferences", session_id, |b| b.preferences(session_id))
    }

    /// Forget the session everywhere, including anything written to the
    /// in-memory backend while the durable one was failing.
    pub fn clear(&self, session_id: &SessionId) {
        self.dispatch("clear", session_id, |b| b.clear(session_id));
        if self.active_durable().is_some() {
            if let Err(e) = self.fallback.clear(session_id) {
                warn!(session_id = %session_id, error = %e, "memory operation failed");
            }
        }
    }
}
