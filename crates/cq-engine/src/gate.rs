//! Confirmation gate: destructive plans wait here, keyed by plan identity,
//! until they are confirmed, cancelled or expire.
//!
//! Nothing is held past its deadline. Expired entries are handed back to
//! the caller (for auditing) the next time the gate is touched.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use cq_protocol::{Instruction, OperationPlan, ParameterSet, PlanId, ValidationVerdict};
use tokio::sync::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::safety::ScopeEstimate;

/// A plan awaiting an explicit acknowledgment.
#[derive(Debug, Clone)]
pub struct PendingPlan {
    pub plan_id: PlanId,
    pub plan: OperationPlan,
    pub instruction: Instruction,
    pub confidence: f64,
    pub params: ParameterSet,
    /// The needs-confirmation verdict that put the plan here.
    pub verdict: ValidationVerdict,
    /// Scope estimated at submission; re-estimated before execution.
    pub estimate: ScopeEstimate,
    pub expires_at: DateTime<Utc>,
}

impl PendingPlan {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct ConfirmationGate {
    ttl: Duration,
    pending: Mutex<HashMap<PlanId, PendingPlan>>,
}

impl ConfirmationGate {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: i64::try_from(ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Deadline for a plan held at `now`.
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Hold a plan. A structurally identical plan already waiting is
    /// replaced and returned.
    pub async fn hold(&self, pending: PendingPlan) -> Option<PendingPlan> {
        let id = pending.plan_id.clone();
        tracing::info!(plan_id = %id, expires_at = %pending.expires_at, "plan held for confirmation");
        self.pending.lock().await.insert(id, pending)
    }

    /// Remove and return a pending plan. Fails when the id is unknown or
    /// the deadline has passed; an expired plan stays put until `expire`
    /// collects it, so its expiry is reported exactly once.
    pub async fn take(&self, plan_id: &PlanId, now: DateTime<Utc>) -> EngineResult<PendingPlan> {
        let mut guard = self.pending.lock().await;
        match guard.get(plan_id) {
            None => Err(EngineError::ConfirmationUnknown(plan_id.clone())),
            Some(p) if p.is_expired(now) => Err(EngineError::ConfirmationExpired(plan_id.clone())),
            Some(_) => guard
                .remove(plan_id)
                .ok_or_else(|| EngineError::ConfirmationUnknown(plan_id.clone())),
        }
    }

    /// Drop every plan whose deadline has passed and return them.
    pub async fn expire(&self, now: DateTime<Utc>) -> Vec<PendingPlan> {
        let mut guard = self.pending.lock().await;
        let expired: Vec<PlanId> = guard
            .iter()
            .filter(|(_, p)| p.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        let mut out: Vec<PendingPlan> = expired.iter().filter_map(|id| guard.remove(id)).collect();
        out.sort_by_key(|p| p.instruction.seq);
        if !out.is_empty() {
            tracing::info!(count = out.len(), "expired pending plans");
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
