//! Process-local conversation memory.
//!
//! Each session keeps at most `max_turns` turns, pruning the oldest on
//! insert. The backend tracks at most `max_sessions` sessions; when a new
//! session pushes it over the cap, the least recently accessed sessions
//! beyond the cap are dropped together.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use keel_contracts::{
    config::MemoryConfig,
    error::KeelResult,
    ids::SessionId,
    memory::ConversationTurn,
};

use crate::backend::MemoryBackend;

#[derive(Debug)]
struct SessionState {
    /// Expiry `None` means the TTL overflowed the clock: never expires.
    turns: VecDeque<(ConversationTurn, Option<Instant>)>,
    summary: Option<(String, Option<Instant>)>,
    preferences: BTreeMap<String, String>,
    /// Logical access clock value; larger means more recent.
    last_access: u64,
}

impl SessionState {
    fn new(now: u64) -> Self {
        Self {
            turns: VecDeque::new(),
            summary: None,
            preferences: BTreeMap::new(),
            last_access: now,
        }
    }
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<SessionId, SessionState>,
    clock: u64,
}

impl Sessions {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// The session's state, touched as most recently used.
    fn touch(&mut self, session_id: &SessionId) -> Option<&mut SessionState> {
        let now = self.tick();
        self.by_id.get_mut(session_id).map(|state| {
            state.last_access = now;
            state
        })
    }
}

fn is_expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|at| now >= at)
}

/// In-process `MemoryBackend`. Always available.
#[derive(Debug)]
pub struct InMemoryBackend {
    max_turns: usize,
    max_sessions: usize,
    turn_ttl: Duration,
    summary_ttl: Duration,
    sessions: Mutex<Sessions>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl InMemoryBackend {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            max_sessions: config.max_sessions.max(1),
            turn_ttl: config.turn_ttl(),
            summary_ttl: config.summary_ttl(),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sessions currently tracked.
    pub fn session_count(&self) -> usize {
        self.lock().by_id.len()
    }

    /// Run `f` on the session's state, creating it (and evicting stale
    /// sessions) if it does not exist.
    fn with_session<T>(&self, session_id: &SessionId, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut sessions = self.lock();
        let now = sessions.tick();
        let is_new = !sessions.by_id.contains_key(session_id);

        let state = sessions
            .by_id
            .entry(session_id.clone())
            .or_insert_with(|| SessionState::new(now));
        state.last_access = now;
        let value = f(state);

        if is_new {
            self.evict_over_cap(&mut sessions, session_id);
        }
        value
    }

    fn evict_over_cap(&self, sessions: &mut Sessions, keep: &SessionId) {
        let excess = sessions.by_id.len().saturating_sub(self.max_sessions);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(u64, SessionId)> = sessions
            .by_id
            .iter()
            .filter(|(id, _)| *id != keep)
            .map(|(id, state)| (state.last_access, id.clone()))
            .collect();
        by_age.sort();

        for (_, id) in by_age.into_iter().take(excess) {
            sessions.by_id.remove(&id);
        }
        debug!(evicted = excess, cap = self.max_sessions, "memory sessions evicted");
    }
}

impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    fn add_turn(&self, session_id: &SessionId, turn: &ConversationTurn) -> KeelResult<()> {
        let expires_at = Instant::now().checked_add(self.turn_ttl);
        let max_turns = self.max_turns;
        self.with_session(session_id, |state| {
            state.turns.push_back((turn.clone(), expires_at));
            while state.turns.len() > max_turns {
                state.turns.pop_front();
            }
        });
        Ok(())
    }

    fn recent_turns(&self, session_id: &SessionId, n: usize) -> KeelResult<Vec<ConversationTurn>> {
        let mut sessions = self.lock();
        let Some(state) = sessions.touch(session_id) else {
            return Ok(Vec::new());
        };

        let now = Instant::now();
        state.turns.retain(|(_, expires_at)| !is_expired(*expires_at, now));
        let skip = state.turns.len().saturating_sub(n);
        Ok(state.turns.iter().skip(skip).map(|(turn, _)| turn.clone()).collect())
    }

    fn set_summary(&self, session_id: &SessionId, summary: &str) -> KeelResult<()> {
        let expires_at = Instant::now().checked_add(self.summary_ttl);
        self.with_session(session_id, |state| {
            state.summary = Some((summary.to_string(), expires_at));
        });
        Ok(())
    }

    fn summary(&self, session_id: &SessionId) -> KeelResult<Option<String>> {
        let mut sessions = self.lock();
        let Some(state) = sessions.touch(session_id) else {
            return Ok(None);
        };

        let now = Instant::now();
        if state.summary.as_ref().is_some_and(|(_, at)| is_expired(*at, now)) {
            state.summary = None;
        }
        Ok(state.summary.as_ref().map(|(summary, _)| summary.clone()))
    }

    fn set_preference(&self, session_id: &SessionId, key: &str, value: &str) -> KeelResult<()> {
        self.with_session(session_id, |state| {
            state.preferences.insert(key.to_string(), value.to_string());
        });
        Ok(())
    }

    fn preferences(&self, session_id: &SessionId) -> KeelResult<BTreeMap<String, String>> {
        Ok(self
            .lock()
            .touch(session_id)
            .map(|state| state.preferences.clone())
            .unwrap_or_default())
    }

    fn clear(&self, session_id: &SessionId) -> KeelResult<()> {
        self.lock().by_id.remove(session_id);
        Ok(())
    }
}
