//! Pipeline error taxonomy.
//!
//! Every variant is recoverable at the pipeline boundary and carries enough
//! context (stage, intent, partial parameters) for the caller to rephrase
//! or confirm.

use cq_protocol::{
    ColumnType, Intent, OperationPlan, ParamRole, ParameterSet, PlanId, SchemaError, Stage,
};
use cq_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("instruction does not match a supported operation (confidence {confidence:.2})")]
    ClassificationAmbiguous { confidence: f64 },

    #[error("missing parameter(s) for {intent}: {}", roles(missing))]
    ExtractionIncomplete {
        intent: Intent,
        missing: Vec<ParamRole>,
        params: Box<ParameterSet>,
    },

    #[error("'{word}' could refer to any of {}", candidates.join(", "))]
    ExtractionAmbiguous {
        intent: Intent,
        role: ParamRole,
        word: String,
        candidates: Vec<String>,
        params: Box<ParameterSet>,
    },

    #[error("type mismatch on {column} ({column_type}): {detail}")]
    CompileTypeMismatch {
        intent: Intent,
        column: String,
        column_type: ColumnType,
        detail: String,
    },

    #[error("unknown reference: {reference}")]
    CompileUnknownReference { intent: Intent, reference: String },

    #[error("cannot compile {intent}: {reason}")]
    CompileInvalid { intent: Intent, reason: String },

    #[error("rejected: {reason}")]
    ValidationRejected {
        stage: Stage,
        reason: String,
        plan: Option<Box<OperationPlan>>,
    },

    #[error("plan {plan_id} still awaits confirmation")]
    ValidationNeedsConfirmation { plan_id: PlanId },

    #[error("no pending plan with id {0}")]
    ConfirmationUnknown(PlanId),

    #[error("confirmation window for plan {0} has expired")]
    ConfirmationExpired(PlanId),

    #[error("execution failed: {0}")]
    Execution(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("schema for '{0}' does not match the data source")]
    SourceMismatch(String),

    #[error("audit log error: {0}")]
    Audit(String),
}

fn roles(missing: &[ParamRole]) -> String {
    missing
        .iter()
        .map(ParamRole::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl EngineError {
    /// Pipeline stage that raised the error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::ClassificationAmbiguous { .. } => Stage::Classification,
            Self::ExtractionIncomplete { .. } | Self::ExtractionAmbiguous { .. } => {
                Stage::Extraction
            }
            Self::CompileTypeMismatch { .. }
            | Self::CompileUnknownReference { .. }
            | Self::CompileInvalid { .. } => Stage::Compilation,
            Self::ValidationRejected { stage, .. } => *stage,
            Self::ValidationNeedsConfirmation { .. }
            | Self::ConfirmationUnknown(_)
            | Self::ConfirmationExpired(_) => Stage::Confirmation,
            Self::Execution(_) | Self::Audit(_) => Stage::Execution,
            Self::Schema(_) | Self::SourceMismatch(_) => Stage::Compilation,
        }
    }

    pub fn intent(&self) -> Option<Intent> {
        match self {
            Self::ExtractionIncomplete { intent, .. }
            | Self::ExtractionAmbiguous { intent, .. }
            | Self::CompileTypeMismatch { intent, .. }
            | Self::CompileUnknownReference { intent, .. }
            | Self::CompileInvalid { intent, .. } => Some(*intent),
            Self::ValidationRejected { plan: Some(p), .. } => Some(p.intent),
            Self::ClassificationAmbiguous { .. } => Some(Intent::Unknown),
            _ => None,
        }
    }

    /// Parameters extracted before the failure, if extraction ran.
    pub fn params(&self) -> Option<&ParameterSet> {
        match self {
            Self::ExtractionIncomplete { params, .. } | Self::ExtractionAmbiguous { params, .. } => {
                Some(params)
            }
            _ => None,
        }
    }

    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassificationAmbiguous { .. } => "classification_ambiguous",
            Self::ExtractionIncomplete { .. } => "extraction_incomplete",
            Self::ExtractionAmbiguous { .. } => "extraction_ambiguous",
            Self::CompileTypeMismatch { .. } => "compile_type_mismatch",
            Self::CompileUnknownReference { .. } => "compile_unknown_reference",
            Self::CompileInvalid { .. } => "compile_invalid",
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::ValidationNeedsConfirmation { .. } => "validation_needs_confirmation",
            Self::ConfirmationUnknown(_) => "confirmation_unknown",
            Self::ConfirmationExpired(_) => "confirmation_expired",
            Self::Execution(_) => "execution_error",
            Self::Schema(_) => "schema_error",
            Self::SourceMismatch(_) => "schema_mismatch",
            Self::Audit(_) => "audit_error",
        }
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_lists_missing_roles() {
        let err = EngineError::ExtractionIncomplete {
            intent: Intent::ReplaceValue,
            missing: vec![ParamRole::Value, ParamRole::Replacement],
            params: Box::new(ParameterSet::new(Intent::ReplaceValue)),
        };
        assert_eq!(err.stage(), Stage::Extraction);
        assert_eq!(err.intent(), Some(Intent::ReplaceValue));
        assert!(err.to_string().contains("value, replacement"));
        assert!(err.params().is_some());
    }

    #[test]
    fn store_errors_surface_as_execution() {
        let err: EngineError = StoreError::UnknownTable("visits".into()).into();
        assert_eq!(err.stage(), Stage::Execution);
        assert_eq!(err.kind(), "execution_error");
    }
}
