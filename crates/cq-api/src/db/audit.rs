//! PostgreSQL-backed audit log. Rows are inserted and read, never updated;
//! the migration installs a trigger that refuses UPDATE and DELETE.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cq_engine::{AuditStore, EngineError, EngineResult};
use cq_protocol::{AuditRecord, Instruction};
use sqlx::PgPool;
use uuid::Uuid;

/// Audit row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub seq: i64,
    pub instruction: String,
    pub received_at: DateTime<Utc>,
    pub intent: String,
    pub confidence: f64,
    pub params: Option<serde_json::Value>,
    pub plan_id: Option<String>,
    pub plan: Option<serde_json::Value>,
    pub verdict: Option<serde_json::Value>,
    pub outcome_status: String,
    pub outcome: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

fn audit_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Audit(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> EngineResult<Option<serde_json::Value>> {
    value
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(audit_err)
}

fn from_json<T: serde::de::DeserializeOwned>(value: Option<serde_json::Value>) -> EngineResult<Option<T>> {
    value.map(serde_json::from_value).transpose().map_err(audit_err)
}

impl AuditRow {
    pub fn from_record(r: &AuditRecord) -> EngineResult<Self> {
        Ok(Self {
            id: r.id,
            seq: i64::try_from(r.seq()).map_err(audit_err)?,
            instruction: r.instruction.text.clone(),
            received_at: r.instruction.received_at,
            intent: r.intent.to_string(),
            confidence: r.confidence,
            params: to_json(&r.params)?,
            plan_id: r.plan.as_ref().map(|p| p.id().0),
            plan: to_json(&r.plan)?,
            verdict: to_json(&r.verdict)?,
            outcome_status: r.outcome.label().to_string(),
            outcome: serde_json::to_value(&r.outcome).map_err(audit_err)?,
            recorded_at: r.recorded_at,
        })
    }

    pub fn into_record(self) -> EngineResult<AuditRecord> {
        Ok(AuditRecord {
            id: self.id,
            instruction: Instruction {
                seq: u64::try_from(self.seq).map_err(audit_err)?,
                text: self.instruction,
                received_at: self.received_at,
            },
            intent: serde_json::from_value(serde_json::Value::String(self.intent)).map_err(audit_err)?,
            confidence: self.confidence,
            params: from_json(self.params)?,
            plan: from_json(self.plan)?,
            verdict: from_json(self.verdict)?,
            outcome: serde_json::from_value(self.outcome).map_err(audit_err)?,
            recorded_at: self.recorded_at,
        })
    }
}

#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Highest instruction sequence number recorded so far (0 when empty).
    pub async fn max_seq(&self) -> EngineResult<u64> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM audit_records")
            .fetch_one(&self.pool)
            .await
            .map_err(audit_err)?;
        u64::try_from(max).map_err(audit_err)
    }
}

#[async_trait]
impl AuditStore for PgAuditLog {
    async fn append(&self, record: AuditRecord) -> EngineResult<()> {
        let row = AuditRow::from_record(&record)?;
        sqlx::query(
            "INSERT INTO audit_records (id, seq, instruction, received_at, intent, confidence, params,
             plan_id, plan, verdict, outcome_status, outcome, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(row.id)
        .bind(row.seq)
        .bind(&row.instruction)
        .bind(row.received_at)
        .bind(&row.intent)
        .bind(row.confidence)
        .bind(&row.params)
        .bind(&row.plan_id)
        .bind(&row.plan)
        .bind(&row.verdict)
        .bind(&row.outcome_status)
        .bind(&row.outcome)
        .bind(row.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(audit_err)?;
        tracing::debug!(seq = row.seq, outcome = %row.outcome_status, "audit record persisted");
        Ok(())
    }

    async fn range(&self, from: u64, to: u64) -> EngineResult<Vec<AuditRecord>> {
        let clamp = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT * FROM audit_records WHERE seq BETWEEN $1 AND $2 ORDER BY seq, recorded_at",
        )
        .bind(clamp(from))
        .bind(clamp(to))
        .fetch_all(&self.pool)
        .await
        .map_err(audit_err)?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }
}
