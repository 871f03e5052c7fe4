//! Composition root: builds every store once and wires them into the
//! executor.

use std::sync::Arc;

use tracing::info;

use keel_contracts::{config::RuntimeConfig, error::KeelResult};
use keel_core::Executor;
use keel_memory::ConversationMemory;
use keel_policy::PolicyTable;
use keel_store::{ArtifactStore, IdempotencyCache};
use keel_trace::{EventStore, Tracer};

use crate::capabilities;

pub struct Runtime {
    pub executor: Executor,
    pub tracer: Tracer,
    pub artifacts: Arc<ArtifactStore>,
    pub answers: IdempotencyCache,
    pub memory: ConversationMemory,
}

impl Runtime {
    pub fn from_config(config: &RuntimeConfig) -> KeelResult<Self> {
        let policy = PolicyTable::from_overrides(&config.policy)?;
        let artifacts = Arc::new(ArtifactStore::from_config(&config.artifacts));
        let tracer = Tracer::new(Arc::new(EventStore::from_config(&config.trace)));

        let executor = Executor::new(
            capabilities::registry(),
            Box::new(policy),
            artifacts.clone(),
            tracer.sink(),
            config.executor.clone(),
        );
        let memory = ConversationMemory::from_config(&config.memory);

        info!(
            memory = memory.backend_name(),
            parallel = config.executor.parallel_levels,
            "runtime assembled"
        );

        Ok(Self {
            executor,
            tracer,
            artifacts,
            answers: IdempotencyCache::from_config(&config.idempotency),
            memory,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
