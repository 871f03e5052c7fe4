//! Durable conversation memory on SQLite.
//!
//! Construction opens the connection, runs `SELECT 1` and creates the
//! schema. If any of that fails the backend is built in an unavailable
//! state and every operation is a silent no-op, so a missing database never
//! takes the runtime down. TTLs are stored as `expires_at` unix-millisecond
//! columns and filtered on read.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use keel_contracts::{
    config::MemoryConfig,
    error::{KeelError, KeelResult},
    ids::SessionId,
    memory::ConversationTurn,
};

use crate::backend::MemoryBackend;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS turns (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id        TEXT    NOT NULL,
    user_message      TEXT    NOT NULL,
    assistant_message TEXT    NOT NULL,
    timestamp         TEXT    NOT NULL,
    metadata          TEXT    NOT NULL,
    expires_at        INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turns_session ON turns (session_id, id);

CREATE TABLE IF NOT EXISTS summaries (
    session_id TEXT    PRIMARY KEY,
    summary    TEXT    NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS preferences (
    session_id TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (session_id, key)
);
";

/// Map rusqlite errors into `KeelError::StorageError` with a message.
trait StorageResultExt<T> {
    fn storage_context(self, message: &str) -> KeelResult<T>;
}

impl<T> StorageResultExt<T> for Result<T, rusqlite::Error> {
    fn storage_context(self, message: &str) -> KeelResult<T> {
        self.map_err(|e| KeelError::StorageError {
            reason: format!("{}: {}", message, e),
        })
    }
}

/// SQLite-backed `MemoryBackend`.
pub struct SqliteBackend {
    /// `None` when the connectivity check failed.
    connection: Option<Mutex<Connection>>,
    max_turns: usize,
    turn_ttl_ms: i64,
    summary_ttl_ms: i64,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("available", &self.connection.is_some())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl SqliteBackend {
    /// Connect to `connection` (a database path or `:memory:`).
    ///
    /// Never fails: a connection that cannot be opened or initialised yields
    /// an unavailable backend and a `warn!`.
    pub fn connect(connection: &str, config: &MemoryConfig) -> Self {
        let connection = match Self::open(connection) {
            Ok(conn) => {
                info!(connection = %connection, "durable memory connected");
                Some(Mutex::new(conn))
            }
            Err(e) => {
                warn!(connection = %connection, error = %e, "durable memory unavailable");
                None
            }
        };

        Self {
            connection,
            max_turns: config.max_turns,
            turn_ttl_ms: duration_ms(config.turn_ttl_secs),
            summary_ttl_ms: duration_ms(config.summary_ttl_secs),
        }
    }

    fn open(connection: &str) -> KeelResult<Connection> {
        let conn = Connection::open(connection).storage_context("failed to open memory database")?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .storage_context("memory database connectivity check failed")?;
        conn.execute_batch(SCHEMA)
            .storage_context("failed to initialize memory schema")?;
        Ok(conn)
    }

    /// The locked connection, or `None` when unavailable.
    fn conn(&self) -> KeelResult<Option<MutexGuard<'_, Connection>>> {
        match &self.connection {
            None => Ok(None),
            Some(mutex) => mutex.lock().map(Some).map_err(|e| KeelError::LockPoisoned {
                resource: format!("memory database: {}", e),
            }),
        }
    }
}

fn duration_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn turn_from_row(
    user_message: String,
    assistant_message: String,
    timestamp: String,
    metadata: String,
) -> KeelResult<ConversationTurn> {
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| KeelError::Serialization {
            reason: format!("invalid turn timestamp '{}': {}", timestamp, e),
        })?
        .with_timezone(&Utc);
    Ok(ConversationTurn {
        user_message,
        assistant_message,
        timestamp,
        metadata: serde_json::from_str(&metadata)?,
    })
}

impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn is_available(&self) -> bool {
        self.connection.is_some()
    }

    fn add_turn(&self, session_id: &SessionId, turn: &ConversationTurn) -> KeelResult<()> {
        let Some(conn) = self.conn()? else {
            return Ok(());
        };
        let now = now_ms();
        let metadata = serde_json::to_string(&turn.metadata)?;

        conn.execute(
            "INSERT INTO turns (session_id, user_message, assistant_message, timestamp, metadata, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id.as_str(),
                turn.user_message,
                turn.assistant_message,
                turn.timestamp.to_rfc3339(),
                metadata,
                now.saturating_add(self.turn_ttl_ms),
            ],
        )
        .storage_context("failed to insert turn")?;

        let pruned = conn
            .execute(
                "DELETE FROM turns
                 WHERE session_id = ?1
                   AND (expires_at <= ?2
                        OR id NOT IN (SELECT id FROM turns WHERE session_id = ?1
                                      ORDER BY id DESC LIMIT ?3))",
                params![session_id.as_str(), now, self.max_turns as i64],
            )
            .storage_context("failed to prune turns")?;
        if pruned > 0 {
            debug!(session_id = %session_id, pruned, "turns pruned");
        }
        Ok(())
    }

    fn recent_turns(&self, session_id: &SessionId, n: usize) -> KeelResult<Vec<ConversationTurn>> {
        let Some(conn) = self.conn()? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn
            .prepare(
                "SELECT user_message, assistant_message, timestamp, metadata FROM turns
                 WHERE session_id = ?1 AND expires_at > ?2
                 ORDER BY id DESC LIMIT ?3",
            )
            .storage_context("failed to prepare turn query")?;
        let rows = stmt
            .query_map(params![session_id.as_str(), now_ms(), n as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .storage_context("failed to query turns")?
            .collect::<Result<Vec<(String, String, String, String)>, _>>()
            .storage_context("failed to read turn row")?;

        let mut turns = rows
            .into_iter()
            .map(|(user, assistant, timestamp, metadata)| {
                turn_from_row(user, assistant, timestamp, metadata)
            })
            .collect::<KeelResult<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    fn set_summary(&self, session_id: &SessionId, summary: &str) -> KeelResult<()> {
        let Some(conn) = self.conn()? else {
            return Ok(());
        };
        conn.execute(
            "INSERT INTO summaries (session_id, summary, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (session_id) DO UPDATE SET summary = excluded.summary,
                                                    expires_at = excluded.expires_at",
            params![
                session_id.as_str(),
                summary,
                now_ms().saturating_add(self.summary_ttl_ms)
            ],
        )
        .storage_context("failed to store summary")?;
        Ok(())
    }

    fn summary(&self, session_id: &SessionId) -> KeelResult<Option<String>> {
        let Some(conn) = self.conn()? else {
            return Ok(None);
        };
        conn.query_row(
            "SELECT summary FROM summaries WHERE session_id = ?1 AND expires_at > ?2",
            params![session_id.as_str(), now_ms()],
            |row| row.get(0),
        )
        .optional()
        .storage_context("failed to read summary")
    }

    fn set_preference(&self, session_id: &SessionId, key: &str, value: &str) -> KeelResult<()> {
        let Some(conn) = self.conn()? else {
            return Ok(());
        };
        conn.execute(
            "INSERT INTO preferences (session_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (session_id, key) DO UPDATE SET value = excluded.value",
            params![session_id.as_str(), key, value],
        )
        .storage_context("failed to store preference")?;
        Ok(())
    }

    fn preferences(&self, session_id: &SessionId) -> KeelResult<BTreeMap<String, String>> {
        let Some(conn) = self.conn()? else {
            return Ok(BTreeMap::new());
        };
        let mut stmt = conn
            .prepare("SELECT key, value FROM preferences WHERE session_id = ?1")
            .storage_context("failed to prepare preference query")?;
        let prefs = stmt
            .query_map(params![session_id.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .storage_context("failed to query preferences")?
            .collect::<Result<BTreeMap<String, String>, _>>()
            .storage_context("failed to read preference row")?;
        Ok(prefs)
    }

    fn clear(&self, session_id: &SessionId) -> KeelResult<()> {
        let Some(conn) = self.conn()? else {
            return Ok(());
        };
        for table in ["turns", "summaries", "preferences"] {
            conn.execute(
                &format!("DELETE FROM {} WHERE session_id = ?1", table),
                params![session_id.as_str()],
            )
            .storage_context("failed to clear session")?;
        }
        debug!(session_id = %session_id, "durable memory cleared");
        Ok(())
    }
}
