//! Runtime error types for the KEEL infrastructure.
//!
//! These cover configuration, storage, and synchronisation failures. Step
//! failures are not errors at this level: they are classified into the
//! `failure::ErrorKind` taxonomy and resolved inside the executor.

use thiserror::Error;

/// The unified error type for the KEEL runtime.
#[derive(Debug, Error)]
pub enum KeelError {
    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A backing store could not read or write.
    #[error("storage error: {reason}")]
    StorageError { reason: String },

    /// A shared store's mutex was poisoned by a panicking writer.
    #[error("lock poisoned: {resource}")]
    LockPoisoned { resource: String },

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A plan referenced a capability kind with no registered implementation.
    #[error("no capability registered for kind '{kind}'")]
    CapabilityNotRegistered { kind: String },
}

impl From<serde_json::Error> for KeelError {
    fn from(e: serde_json::Error) -> Self {
        KeelError::Serialization { reason: e.to_string() }
    }
}

/// Convenience alias used throughout the KEEL crates.
pub type KeelResult<T> = Result<T, KeelError>;
