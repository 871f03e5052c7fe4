//! Identifier newtypes.
//!
//! Sessions, turns, and spans are the three identifiers threaded through a
//! plan run. Steps and artifacts are named by the planner and the artifact
//! store respectively; answer ids are minted by the idempotency cache.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Construct from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

macro_rules! generated_id {
    ($(#[$meta:meta])* $name:ident) => {
        string_id!($(#[$meta])* $name);

        impl $name {
            /// Mint a fresh, random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }
    };
}

generated_id!(
    /// Identifies a whole conversation. Spans every turn of that conversation.
    SessionId
);

generated_id!(
    /// Identifies one request/response round within a session.
    TurnId
);

generated_id!(
    /// Identifies one traced execution interval.
    SpanId
);

generated_id!(
    /// Externally visible response identifier attached to an idempotency entry.
    ///
    /// Distinct from the cache key so a replayed answer still carries a
    /// stable id of its own.
    AnswerId
);

string_id!(
    /// Planner-assigned step identifier, unique within a plan.
    StepId
);

string_id!(
    /// Content-derived artifact identifier of the form `{kind}_{hash}`.
    ArtifactId
);
