//! Persisted step outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ArtifactId, SessionId, TurnId};

/// An immutable, content-hashed output referenced by id for provenance.
///
/// Two artifacts with the same `kind` and the same `content` always share
/// an `id`; the store keeps the first one written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    /// Producer-defined tag; the executor uses the step id.
    pub kind: String,
    pub session_id: SessionId,
    pub turn_id: Option<TurnId>,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
