//! Shared application state for the Axum server.
//!
//! Supports two audit modes:
//! - **Database mode**: audit records persist to PostgreSQL via `PgPool`.
//! - **In-memory mode**: audit records live in process (tests and development).
//!
//! The dataset itself is always a `MemoryStore`, seeded from a JSON snapshot
//! or the clinical sample.

use std::sync::Arc;

use cq_engine::{AuditStore, Engine, EngineConfig, EngineResult, MemoryAuditLog};
use cq_store::{MemoryStore, sample};
use sqlx::PgPool;

use crate::db::PgAuditLog;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool (None in in-memory mode).
    pub pool: Option<PgPool>,
    /// Instruction pipeline.
    pub engine: Arc<Engine>,
    /// Dataset behind the engine; tables uploaded over the API land here.
    pub store: Arc<MemoryStore>,
}

impl AppState {
    /// State whose audit log persists to PostgreSQL. Sequence numbering
    /// resumes after the highest recorded instruction.
    pub async fn with_pool(pool: PgPool, config: EngineConfig, store: MemoryStore) -> EngineResult<Self> {
        let audit = PgAuditLog::new(pool.clone());
        let last = audit.max_seq().await?;
        let state = Self::build(Some(pool), config, store, Arc::new(audit)).await?;
        state.engine.resume_sequence(last);
        tracing::info!(resume_after = last, "audit log connected");
        Ok(state)
    }

    /// In-memory state over `store`.
    pub async fn new(config: EngineConfig, store: MemoryStore) -> EngineResult<Self> {
        Self::build(None, config, store, Arc::new(MemoryAuditLog::new())).await
    }

    /// In-memory state over the clinical sample dataset.
    pub async fn with_sample_data() -> EngineResult<Self> {
        let store = sample::clinical_store()?;
        Self::new(EngineConfig::default(), store).await
    }

    async fn build(
        pool: Option<PgPool>,
        config: EngineConfig,
        store: MemoryStore,
        audit: Arc<dyn AuditStore>,
    ) -> EngineResult<Self> {
        let store = Arc::new(store);
        let engine = Engine::with_source(config, store.clone(), audit).await?;
        Ok(Self {
            pool,
            engine: Arc::new(engine),
            store,
        })
    }
}
