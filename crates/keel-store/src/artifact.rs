//! Content-addressable artifact store.
//!
//! `ArtifactStore` is the in-memory implementation of `ArtifactSink`.
//! Artifacts are keyed by `{kind}_{hash}`; persisting content that is
//! already stored returns the existing id without rewriting it. A
//! per-session index serves lookups by (session, kind).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use keel_contracts::{
    artifact::Artifact,
    config::ArtifactConfig,
    error::{KeelError, KeelResult},
    ids::{ArtifactId, SessionId, TurnId},
};
use keel_core::traits::ArtifactSink;

use crate::hash::artifact_id;

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct ArtifactState {
    pub(crate) artifacts: HashMap<ArtifactId, Artifact>,
    /// Artifact ids per session, oldest first, without duplicates.
    pub(crate) by_session: HashMap<SessionId, Vec<ArtifactId>>,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// A process-wide, thread-safe artifact store.
///
/// No eviction happens unless `max_per_session` is set, in which case a
/// session's oldest artifacts are dropped once it holds more than the cap.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    state: Mutex<ArtifactState>,
    max_per_session: Option<usize>,
}

impl ArtifactStore {
    /// An unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self {
            state: Mutex::default(),
            max_per_session: config.max_per_session,
        }
    }

    pub fn with_session_cap(max_per_session: usize) -> Self {
        Self {
            state: Mutex::default(),
            max_per_session: Some(max_per_session),
        }
    }

    fn lock(&self) -> KeelResult<MutexGuard<'_, ArtifactState>> {
        self.state.lock().map_err(|e| KeelError::LockPoisoned {
            resource: format!("artifact store: {}", e),
        })
    }

    /// Store `content` under `kind` and return the artifact.
    ///
    /// If an artifact with the same id already exists, the stored one is
    /// returned unchanged.
    pub fn store(
        &self,
        session_id: &SessionId,
        turn_id: Option<&TurnId>,
        kind: &str,
        content: &serde_json::Value,
    ) -> KeelResult<Artifact> {
        let id = artifact_id(kind, content)?;
        let mut state = self.lock()?;

        let artifact = match state.artifacts.get(&id) {
            Some(existing) => {
                debug!(artifact_id = %id, "artifact already stored");
                existing.clone()
            }
            None => {
                let artifact = Artifact {
                    id: id.clone(),
                    kind: kind.to_string(),
                    session_id: session_id.clone(),
                    turn_id: turn_id.cloned(),
                    content: content.clone(),
                    created_at: Utc::now(),
                };
                state.artifacts.insert(id.clone(), artifact.clone());
                debug!(artifact_id = %id, session_id = %session_id, "artifact stored");
                artifact
            }
        };

        let index = state.by_session.entry(session_id.clone()).or_default();
        if !index.contains(&id) {
            index.push(id);
        }

        if let Some(cap) = self.max_per_session {
            evict_over_cap(&mut state, session_id, cap);
        }

        Ok(artifact)
    }

    pub fn get(&self, id: &ArtifactId) -> KeelResult<Option<Artifact>> {
        Ok(self.lock()?.artifacts.get(id).cloned())
    }

    /// This session's artifacts of `kind`, oldest first.
    pub fn get_by_kind(&self, session_id: &SessionId, kind: &str) -> KeelResult<Vec<Artifact>> {
        Ok(self
            .get_by_session(session_id)?
            .into_iter()
            .filter(|a| a.kind == kind)
            .collect())
    }

    /// Every artifact indexed under this session, oldest first.
    pub fn get_by_session(&self, session_id: &SessionId) -> KeelResult<Vec<Artifact>> {
        let state = self.lock()?;
        Ok(state
            .by_session
            .get(session_id)
            .map(|ids| ids.iter().filter_map(|id| state.artifacts.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.artifacts.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trim `session_id`'s index to `cap`, dropping artifacts no other session
/// still references.
fn evict_over_cap(state: &mut ArtifactState, session_id: &SessionId, cap: usize) {
    let evicted: Vec<ArtifactId> = match state.by_session.get_mut(session_id) {
        Some(index) if index.len() > cap => {
            let excess = index.len() - cap;
            index.drain(..excess).collect()
        }
        _ => return,
    };

    for id in &evicted {
        let shared = state.by_session.values().any(|ids| ids.contains(id));
        if !shared {
            state.artifacts.remove(id);
        }
    }
    info!(session_id = %session_id, evicted = evicted.len(), "artifact session cap reached");
}

// ── ArtifactSink impl ─────────────────────────────────────────────────────────

impl ArtifactSink for ArtifactStore {
    fn persist(
        &self,
        session_id: &SessionId,
        turn_id: Option<&TurnId>,
        kind: &str,
        content: &serde_json::Value,
    ) -> KeelResult<ArtifactId> {
        self.store(session_id, turn_id, kind, content).map(|a| a.id)
    }
}
