//! Append-only audit log.
//!
//! One record per terminal outcome, retrievable by instruction sequence
//! range. Nothing here updates or deletes a record.

use async_trait::async_trait;
use cq_protocol::AuditRecord;
use tokio::sync::RwLock;

use crate::error::EngineResult;

/// Durable home for audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> EngineResult<()>;

    /// Records whose instruction sequence number lies in `from..=to`,
    /// ordered by sequence number then recording time.
    async fn range(&self, from: u64, to: u64) -> EngineResult<Vec<AuditRecord>>;
}

/// In-process audit log.
#[derive(Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> EngineResult<()> {
        tracing::debug!(
            seq = record.seq(),
            outcome = record.outcome.label(),
            "audit record appended"
        );
        self.records.write().await.push(record);
        Ok(())
    }

    async fn range(&self, from: u64, to: u64) -> EngineResult<Vec<AuditRecord>> {
        let guard = self.records.read().await;
        let mut out: Vec<AuditRecord> = guard
            .iter()
            .filter(|r| (from..=to).contains(&r.seq()))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.seq().cmp(&b.seq()).then(a.recorded_at.cmp(&b.recorded_at)));
        Ok(out)
    }
}
