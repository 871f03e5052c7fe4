//! The storage seam behind `ConversationMemory`.

use std::collections::BTreeMap;

use keel_contracts::{error::KeelResult, ids::SessionId, memory::ConversationTurn};

/// A place conversation state can live.
///
/// Implementations must be safe to share across threads. Turn retention
/// (the per-session cap and TTLs) is the backend's responsibility.
pub trait MemoryBackend: Send + Sync {
    /// Short name reported by `ConversationMemory::backend_name`.
    fn name(&self) -> &'static str;

    /// Whether the backend can serve requests. An unavailable backend
    /// treats every operation as a no-op.
    fn is_available(&self) -> bool {
        true
    }

    fn add_turn(&self, session_id: &SessionId, turn: &ConversationTurn) -> KeelResult<()>;

    /// The last `n` unexpired turns, oldest first.
    fn recent_turns(&self, session_id: &SessionId, n: usize) -> KeelResult<Vec<ConversationTurn>>;

    fn set_summary(&self, session_id: &SessionId, summary: &str) -> KeelResult<()>;

    fn summary(&self, session_id: &SessionId) -> KeelResult<Option<String>>;

    fn set_preference(&self, session_id: &SessionId, key: &str, value: &str) -> KeelResult<()>;

    fn preferences(&self, session_id: &SessionId) -> KeelResult<BTreeMap<String, String>>;

    /// Forget everything stored for the session.
    fn clear(&self, session_id: &SessionId) -> KeelResult<()>;
}
