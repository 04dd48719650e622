//! Pipeline orchestrator.
//!
//! `submit` runs one instruction through screen, classify, extract,
//! compile, estimate and validate. Read-only plans execute straight away;
//! destructive plans wait at the confirmation gate until `confirm` is called
//! with their plan id. Every terminal outcome appends exactly one audit
//! record.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use cq_protocol::{
    AuditRecord, ChangeSummary, ExecutionOutcome, Instruction, Intent, Operation, OperationPlan,
    ParameterSet, PlanId, ResultSet, Schema, SchemaChange, SchemaError, Stage, TableSchema,
    ValidationVerdict,
};
use cq_store::{DataSource, Mutation};
use serde::Serialize;
use uuid::Uuid;

use crate::audit::AuditStore;
use crate::classifier::IntentClassifier;
use crate::compiler::compile;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::executor::{Execution, Executor};
use crate::extractor::Extractor;
use crate::gate::{ConfirmationGate, PendingPlan};
use crate::registry::SchemaRegistry;
use crate::safety::{ConfirmationToken, SafetyLimits, SafetyValidator, ScopeEstimate};
use crate::screen::screen;

const AFFIRMATIVE: &[&str] = &["yes", "y", "confirm", "confirmed", "proceed", "approve"];
const NEGATIVE: &[&str] = &["no", "n", "cancel", "abort", "reject", "deny", "stop"];

const SUPERSEDED: &str = "superseded by an identical plan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Affirm,
    Decline,
    Unclear,
}

fn reply(token: &str) -> Reply {
    let token = token.trim().to_lowercase();
    if AFFIRMATIVE.contains(&token.as_str()) {
        Reply::Affirm
    } else if NEGATIVE.contains(&token.as_str()) {
        Reply::Decline
    } else {
        Reply::Unclear
    }
}

/// Result of `submit` or `confirm`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    /// The plan ran. `summary` is present for destructive plans.
    Completed {
        seq: u64,
        plan_id: PlanId,
        plan: OperationPlan,
        verdict: ValidationVerdict,
        result: ResultSet,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<ChangeSummary>,
        audit_id: Uuid,
    },
    /// Destructive plan parked at the gate.
    NeedsConfirmation {
        seq: u64,
        plan_id: PlanId,
        plan: OperationPlan,
        reason: String,
        estimate: ScopeEstimate,
        expires_at: DateTime<Utc>,
    },
    Cancelled {
        seq: u64,
        plan_id: PlanId,
        audit_id: Uuid,
    },
}

impl Submission {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::NeedsConfirmation { .. } => "needs_confirmation",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::Completed { seq, .. }
            | Self::NeedsConfirmation { seq, .. }
            | Self::Cancelled { seq, .. } => *seq,
        }
    }

    pub fn plan_id(&self) -> &PlanId {
        match self {
            Self::Completed { plan_id, .. }
            | Self::NeedsConfirmation { plan_id, .. }
            | Self::Cancelled { plan_id, .. } => plan_id,
        }
    }
}

/// What is known about one instruction so far, for its audit record.
struct Trail {
    instruction: Instruction,
    intent: Intent,
    confidence: f64,
    params: Option<ParameterSet>,
    plan: Option<OperationPlan>,
    verdict: Option<ValidationVerdict>,
}

impl Trail {
    fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            intent: Intent::Unknown,
            confidence: 0.0,
            params: None,
            plan: None,
            verdict: None,
        }
    }

    fn from_pending(p: &PendingPlan) -> Self {
        Self {
            instruction: p.instruction.clone(),
            intent: p.plan.intent,
            confidence: p.confidence,
            params: Some(p.params.clone()),
            plan: Some(p.plan.clone()),
            verdict: Some(p.verdict.clone()),
        }
    }

    fn record(self, outcome: ExecutionOutcome) -> AuditRecord {
        let mut record = AuditRecord::new(self.instruction, self.intent, self.confidence, outcome);
        record.params = self.params;
        record.plan = self.plan;
        record.verdict = self.verdict;
        record
    }
}

enum Flow {
    Held(Submission),
    Executed(OperationPlan, Execution),
}

/// The instruction translation and safety engine.
pub struct Engine {
    config: EngineConfig,
    registry: SchemaRegistry,
    classifier: IntentClassifier,
    extractor: Extractor,
    validator: SafetyValidator,
    gate: ConfirmationGate,
    executor: Executor,
    audit: Arc<dyn AuditStore>,
    seq: AtomicU64,
}

impl Engine {
    /// Engine with an empty schema registry.
    pub fn new(config: EngineConfig, source: Arc<dyn DataSource>, audit: Arc<dyn AuditStore>) -> Self {
        let classifier = IntentClassifier::new(config.confidence_threshold);
        let extractor = Extractor::new(
            classifier.vocabulary(),
            config.max_fuzzy_distance,
            config.default_table.clone(),
        );
        Self {
            registry: SchemaRegistry::new(),
            validator: SafetyValidator::new(SafetyLimits::from(&config)),
            gate: ConfirmationGate::new(config.confirmation_ttl_secs),
            executor: Executor::new(source, config.result_row_limit),
            classifier,
            extractor,
            audit,
            seq: AtomicU64::new(0),
            config,
        }
    }

    /// Engine with every table `source` holds registered.
    pub async fn with_source(
        config: EngineConfig,
        source: Arc<dyn DataSource>,
        audit: Arc<dyn AuditStore>,
    ) -> EngineResult<Self> {
        let engine = Self::new(config, source, audit);
        engine.register_from_source().await?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        self.executor.source()
    }

    /// Continue sequence numbering after `last`, e.g. the highest sequence
    /// number already in a persistent audit log.
    pub fn resume_sequence(&self, last: u64) {
        self.seq.fetch_max(last, Ordering::SeqCst);
    }

    pub async fn schema(&self) -> Schema {
        self.registry.snapshot().await
    }

    pub async fn pending_count(&self) -> usize {
        self.gate.len().await
    }

    // ── Instruction boundary ────────────────────────────────────

    pub async fn submit(&self, text: &str) -> EngineResult<Submission> {
        self.expire_pending().await?;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(seq, chars = text.chars().count(), "instruction received");
        let mut trail = Trail::new(Instruction::new(seq, text));
        match self.translate(text, &mut trail).await {
            Ok(Flow::Held(submission)) => Ok(submission),
            Ok(Flow::Executed(plan, execution)) => self.complete(trail, plan, execution).await,
            Err(e) => Err(self.fail(trail, e).await),
        }
    }

    /// Second half of the two-step boundary for a held plan. An affirmative
    /// token executes it, a negative one cancels it, anything else leaves it
    /// waiting.
    pub async fn confirm(&self, plan_id: &PlanId, token: &str) -> EngineResult<Submission> {
        if self.expire_pending().await?.contains(plan_id) {
            return Err(EngineError::ConfirmationExpired(plan_id.clone()));
        }
        let pending = self.gate.take(plan_id, Utc::now()).await?;
        match reply(token) {
            Reply::Unclear => {
                tracing::info!(plan_id = %plan_id, "confirmation token not understood; plan still held");
                self.park(pending).await?;
                Err(EngineError::ValidationNeedsConfirmation {
                    plan_id: plan_id.clone(),
                })
            }
            Reply::Decline => {
                let record = Trail::from_pending(&pending).record(ExecutionOutcome::Cancelled {
                    plan_id: plan_id.clone(),
                });
                let (seq, audit_id) = (record.seq(), record.id);
                self.audit.append(record).await?;
                tracing::info!(seq, plan_id = %plan_id, "plan cancelled");
                Ok(Submission::Cancelled {
                    seq,
                    plan_id: plan_id.clone(),
                    audit_id,
                })
            }
            Reply::Affirm => {
                let mut trail = Trail::from_pending(&pending);
                let plan = pending.plan;
                match self.run_confirmed(&mut trail, plan.clone()).await {
                    Ok(execution) => self.complete(trail, plan, execution).await,
                    Err(e) => Err(self.fail(trail, e).await),
                }
            }
        }
    }

    /// Audit and drop every held plan past its deadline. Returns their ids.
    pub async fn expire_pending(&self) -> EngineResult<Vec<PlanId>> {
        let mut ids = Vec::new();
        for pending in self.gate.expire(Utc::now()).await {
            let plan_id = pending.plan_id.clone();
            let record = Trail::from_pending(&pending).record(ExecutionOutcome::Expired {
                plan_id: plan_id.clone(),
            });
            tracing::info!(seq = record.seq(), plan_id = %plan_id, "plan expired unconfirmed");
            self.audit.append(record).await?;
            ids.push(plan_id);
        }
        Ok(ids)
    }

    // ── Administrative boundary ─────────────────────────────────

    /// Make a table the data source holds visible to the pipeline. The
    /// declared schema must match what the source reports.
    pub async fn register_schema(&self, table: TableSchema) -> EngineResult<()> {
        let stored = self.source().get_schema(&table.name).await?;
        if stored != table {
            return Err(EngineError::SourceMismatch(table.name));
        }
        self.registry.register(table).await
    }

    /// Register every source table not yet known. Returns how many were
    /// added.
    pub async fn register_from_source(&self) -> EngineResult<usize> {
        self.registry.register_from_source(self.source().as_ref()).await
    }

    /// Apply a schema change to both the data source and the registry.
    pub async fn evolve_schema(&self, table: &str, change: &SchemaChange) -> EngineResult<TableSchema> {
        let schema = self.registry.snapshot().await;
        let current = schema
            .table(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        change.apply(current)?;

        let _guard = self.executor.lock(&current.name).await;
        let mutation = match change {
            SchemaChange::RenameColumn { from, to } => Mutation::RenameColumn {
                from: from.clone(),
                to: to.clone(),
            },
            SchemaChange::AddColumn { column } => Mutation::AddColumn {
                column: column.clone(),
            },
        };
        self.source().write_rows(&current.name, &mutation).await?;
        self.registry.evolve(&current.name, change).await
    }

    pub async fn audit_range(&self, from: u64, to: u64) -> EngineResult<Vec<AuditRecord>> {
        self.audit.range(from, to).await
    }

    // ── Stages ──────────────────────────────────────────────────

    async fn translate(&self, text: &str, trail: &mut Trail) -> EngineResult<Flow> {
        let seq = trail.instruction.seq;
        if let Err(reason) = screen(text) {
            trail.verdict = Some(ValidationVerdict::rejected(reason.clone()));
            return Err(EngineError::ValidationRejected {
                stage: Stage::Screening,
                reason,
                plan: None,
            });
        }

        let classification = self.classifier.classify(text);
        trail.intent = classification.intent;
        trail.confidence = classification.confidence;
        if classification.intent == Intent::Unknown {
            return Err(EngineError::ClassificationAmbiguous {
                confidence: classification.confidence,
            });
        }

        let schema = self.registry.snapshot().await;
        let params = self.extractor.extract(text, classification.intent, &schema)?;
        trail.intent = params.intent;
        trail.params = Some(params.clone());
        let plan = compile(&params, &schema)?;
        trail.plan = Some(plan.clone());
        let plan_id = plan.id();
        tracing::info!(
            seq,
            intent = %plan.intent,
            table = %plan.table,
            plan_id = %plan_id,
            destructive = plan.destructive,
            "plan compiled"
        );

        if !plan.destructive {
            let guard = self.executor.lock(&plan.table).await;
            let approved = match self.validator.approve(plan.clone(), &schema, None, None) {
                Ok(approved) => approved,
                Err(verdict) => return Err(rejection(trail, verdict, plan)),
            };
            trail.verdict = Some(ValidationVerdict::Approved);
            let execution = self.executor.execute(&approved, &guard).await?;
            return Ok(Flow::Executed(plan, execution));
        }

        let estimate = self.estimate(&plan).await;
        let verdict = self.validator.validate(&plan, &schema, estimate.as_ref(), None);
        if !matches!(verdict, ValidationVerdict::NeedsConfirmation { .. }) {
            return Err(rejection(trail, verdict, plan));
        }
        let reason = verdict.reason().unwrap_or_default().to_string();
        // Never park a plan that would be refused once confirmed.
        let preflight = self.validator.preflight(&plan, &schema, estimate.as_ref());
        if !preflight.is_approved() {
            return Err(rejection(trail, preflight, plan));
        }
        let estimate = estimate.unwrap_or_default();
        trail.verdict = Some(verdict.clone());

        let expires_at = self.gate.deadline(Utc::now());
        let submission = Submission::NeedsConfirmation {
            seq,
            plan_id: plan_id.clone(),
            plan: plan.clone(),
            reason,
            estimate,
            expires_at,
        };
        self.park(PendingPlan {
            plan_id,
            plan,
            instruction: trail.instruction.clone(),
            confidence: trail.confidence,
            params,
            verdict: verdict.clone(),
            estimate,
            expires_at,
        })
        .await?;
        Ok(Flow::Held(submission))
    }

    /// Hold a plan at the gate. A plan it displaces is audited as
    /// superseded so its instruction still gets a terminal record.
    async fn park(&self, pending: PendingPlan) -> EngineResult<()> {
        if let Some(old) = self.gate.hold(pending).await {
            tracing::info!(seq = old.instruction.seq, plan_id = %old.plan_id, "held plan superseded");
            let record = Trail::from_pending(&old).record(ExecutionOutcome::NotExecuted {
                stage: Stage::Confirmation,
                reason: SUPERSEDED.into(),
            });
            self.audit.append(record).await?;
        }
        Ok(())
    }

    /// Lock, re-estimate against current data, validate with a token bound
    /// to this exact plan, then execute.
    async fn run_confirmed(&self, trail: &mut Trail, plan: OperationPlan) -> EngineResult<Execution> {
        let schema = self.registry.snapshot().await;
        let guard = self.executor.lock(&plan.table).await;
        let estimate = self.estimate(&plan).await;
        let token = ConfirmationToken::for_plan(&plan);
        let approved = match self
            .validator
            .approve(plan.clone(), &schema, estimate.as_ref(), Some(&token))
        {
            Ok(approved) => approved,
            Err(verdict) => return Err(rejection(trail, verdict, plan)),
        };
        trail.verdict = Some(ValidationVerdict::Approved);
        let execution = self.executor.execute(&approved, &guard).await?;

        if let Operation::RenameColumn { from, to } = &plan.operation {
            let change = SchemaChange::RenameColumn {
                from: from.clone(),
                to: to.clone(),
            };
            self.registry.evolve(&plan.table, &change).await?;
        }
        Ok(execution)
    }

    /// Dry-run scope, or `None` when the source cannot produce one.
    async fn estimate(&self, plan: &OperationPlan) -> Option<ScopeEstimate> {
        match self.executor.estimate(plan).await {
            Ok(scope) => Some(scope),
            Err(e) => {
                tracing::warn!(plan_id = %plan.id(), error = %e, "scope estimate failed");
                None
            }
        }
    }

    async fn complete(
        &self,
        trail: Trail,
        plan: OperationPlan,
        execution: Execution,
    ) -> EngineResult<Submission> {
        let summary = plan.destructive.then_some(execution.summary);
        let record = trail.record(ExecutionOutcome::Completed {
            rows_returned: execution.result.total_rows,
            summary: summary.clone(),
        });
        let seq = record.seq();
        let audit_id = record.id;
        let verdict = record.verdict.clone().unwrap_or(ValidationVerdict::Approved);
        self.audit.append(record).await?;
        Ok(Submission::Completed {
            seq,
            plan_id: plan.id(),
            plan,
            verdict,
            result: execution.result,
            summary,
            audit_id,
        })
    }

    /// Audit a failed instruction and hand the error back.
    async fn fail(&self, mut trail: Trail, e: EngineError) -> EngineError {
        let seq = trail.instruction.seq;
        let outcome = match &e {
            EngineError::Execution(err) => ExecutionOutcome::Failed {
                error: err.to_string(),
            },
            other => ExecutionOutcome::NotExecuted {
                stage: other.stage(),
                reason: other.to_string(),
            },
        };
        if trail.params.is_none() {
            trail.params = e.params().cloned();
        }
        tracing::warn!(seq, stage = %e.stage(), kind = e.kind(), error = %e, "instruction not executed");
        if let Err(audit_err) = self.audit.append(trail.record(outcome)).await {
            tracing::error!(seq, error = %audit_err, "failed to append audit record");
        }
        e
    }
}

fn rejection(trail: &mut Trail, verdict: ValidationVerdict, plan: OperationPlan) -> EngineError {
    let reason = verdict.reason().unwrap_or("not approved").to_string();
    trail.verdict = Some(verdict);
    EngineError::ValidationRejected {
        stage: Stage::Validation,
        reason,
        plan: Some(Box::new(plan)),
    }
}
