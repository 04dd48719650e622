use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::ChangeSummary;
use crate::intent::Intent;
use crate::params::ParameterSet;
use crate::plan::{OperationPlan, PlanId};
use crate::verdict::ValidationVerdict;

/// Raw instruction text plus its submission sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub seq: u64,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl Instruction {
    pub fn new(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Pipeline stage, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Screening,
    Classification,
    Extraction,
    Compilation,
    Validation,
    Confirmation,
    Execution,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screening => "screening",
            Self::Classification => "classification",
            Self::Extraction => "extraction",
            Self::Compilation => "compilation",
            Self::Validation => "validation",
            Self::Confirmation => "confirmation",
            Self::Execution => "execution",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an instruction ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Stopped before execution.
    NotExecuted { stage: Stage, reason: String },
    Completed {
        rows_returned: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<ChangeSummary>,
    },
    /// Backend failure; the data source was left unchanged.
    Failed { error: String },
    /// The operator declined the confirmation prompt.
    Cancelled { plan_id: PlanId },
    /// No confirmation arrived before the deadline.
    Expired { plan_id: PlanId },
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotExecuted { .. } => "not_executed",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
            Self::Expired { .. } => "expired",
        }
    }
}

/// Append-only record of one processed instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub instruction: Instruction,
    pub intent: Intent,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<ParameterSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<OperationPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ValidationVerdict>,
    pub outcome: ExecutionOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(instruction: Instruction, intent: Intent, confidence: f64, outcome: ExecutionOutcome) -> Self {
        Self {
            id: Uuid::now_v7(),
            instruction,
            intent,
            confidence,
            params: None,
            plan: None,
            verdict: None,
            outcome,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_params(mut self, params: ParameterSet) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_plan(mut self, plan: OperationPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_verdict(mut self, verdict: ValidationVerdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn seq(&self) -> u64 {
        self.instruction.seq
    }
}
