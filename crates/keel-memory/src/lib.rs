//! # keel-memory
//!
//! Per-session conversation memory for the KEEL runtime: a bounded turn
//! history, an optional summary, and a preference map.
//!
//! ## Backends
//!
//! | Backend            | Storage                   | When used                        |
//! |--------------------|---------------------------|----------------------------------|
//! | [`SqliteBackend`]  | SQLite file or `:memory:` | `memory.connection` is set       |
//! | [`InMemoryBackend`]| process heap              | no connection, or durable failed |
//!
//! [`ConversationMemory`] hides the choice. A durable backend that fails its
//! connectivity check at startup turns into a no-op and the facade serves
//! from memory instead.

pub mod backend;
pub mod in_memory;
pub mod memory;
pub mod sqlite;

pub use backend::MemoryBackend;
pub use in_memory::InMemoryBackend;
pub use memory::ConversationMemory;
pub use sqlite::SqliteBackend;

// ── Tests ─────────────────────────────────────────────────────────────────────
