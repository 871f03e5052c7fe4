//! # keel-core
//!
//! Plan scheduling and failure-policy-aware execution for the KEEL runtime.
//!
//! This crate provides:
//! - The seams the executor depends on (`Capability`, `FailurePolicy`,
//!   `ArtifactSink`, `EventSink`, `Sleeper`)
//! - `schedule`, which layers a plan into dependency levels
//! - `SpanGuard` / `in_span`, scoped spans over any `EventSink`
//! - The `Executor` that runs levels in order and resolves every step failure
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keel_core::{CapabilityRegistry, Executor};
//!
//! let registry = CapabilityRegistry::new().with("fetch_repo", FetchRepo::new(client));
//! let executor = Executor::new(registry, Box::new(table), artifacts, events, config);
//! let report = executor.run(&plan, &session_id, &turn_id);
//! ```

pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod span;
pub mod traits;

pub use executor::{Executor, StepOutcome};
pub use registry::CapabilityRegistry;
pub use scheduler::schedule;
pub use span::{in_span, SpanGuard};
