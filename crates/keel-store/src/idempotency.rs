//! Idempotency cache keyed by (session, turn, step name).
//!
//! A repeated request for the same logical unit of work returns the stored
//! value instead of recomputing it. Every entry carries its own `AnswerId`,
//! minted when the value is first registered, so a replayed answer still
//! has a stable externally visible id. Entries expire lazily: an expired
//! entry is removed by the lookup that finds it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use keel_contracts::{
    config::IdempotencyConfig,
    ids::{AnswerId, SessionId, TurnId},
};

/// The (session, turn, step) tuple identifying one logical unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub step: String,
}

impl IdempotencyKey {
    pub fn new(session_id: SessionId, turn_id: TurnId, step: impl Into<String>) -> Self {
        Self {
            session_id,
            turn_id,
            step: step.into(),
        }
    }
}

/// A value served by the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnswer<V> {
    pub value: V,
    pub answer_id: AnswerId,
    /// True when the value came from an earlier registration.
    pub hit: bool,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    answer_id: AnswerId,
    /// `None` when the TTL is too large to represent: never expires.
    expires_at: Option<Instant>,
}

/// Process-wide cache of computed answers.
///
/// When disabled, lookups always miss and nothing is stored, but answers
/// still get fresh ids so call sites need no special casing.
#[derive(Debug)]
pub struct IdempotencyCache<V = serde_json::Value> {
    ttl: Duration,
    enabled: bool,
    entries: Mutex<HashMap<IdempotencyKey, Entry<V>>>,
}

impl<V: Clone> Default for IdempotencyCache<V> {
    fn default() -> Self {
        Self::from_config(&IdempotencyConfig::default())
    }
}

impl<V: Clone> IdempotencyCache<V> {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            ttl,
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &IdempotencyConfig) -> Self {
        Self::new(config.ttl(), config.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IdempotencyKey, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The stored answer for `key`, if present and unexpired.
    pub fn get(&self, key: &IdempotencyKey) -> Option<CachedAnswer<V>> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) if entry.expires_at.map_or(true, |at| Instant::now() < at) => {
                debug!(
                    session_id = %key.session_id,
                    turn_id = %key.turn_id,
                    step = %key.step,
                    answer_id = %entry.answer_id,
                    "idempotency hit"
                );
                return Some(CachedAnswer {
                    value: entry.value.clone(),
                    answer_id: entry.answer_id.clone(),
                    hit: true,
                });
            }
            Some(_) => true,
        };

        if expired {
            debug!(session_id = %key.session_id, step = %key.step, "idempotency entry expired");
            entries.remove(key);
        }
        None
    }

    /// Register `value` under `key` with a freshly minted answer id.
    pub fn put(&self, key: IdempotencyKey, value: V) -> CachedAnswer<V> {
        let answer_id = AnswerId::generate();
        if self.enabled {
            let entry = Entry {
                value: value.clone(),
                answer_id: answer_id.clone(),
                expires_at: Instant::now().checked_add(self.ttl),
            };
            self.lock().insert(key, entry);
        }
        CachedAnswer {
            value,
            answer_id,
            hit: false,
        }
    }

    /// Return the stored answer, or run `compute` and register its result.
    ///
    /// Errors from `compute` are returned as-is and nothing is cached. The
    /// lock is not held while `compute` runs.
    pub fn get_or_compute<E, F>(&self, key: IdempotencyKey, compute: F) -> Result<CachedAnswer<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(answer) = self.get(&key) {
            return Ok(answer);
        }
        let value = compute()?;
        Ok(self.put(key, value))
    }

    /// Drop the entry for `key`, returning whether one existed.
    pub fn invalidate(&self, key: &IdempotencyKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Number of stored entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
