//! Safety validator.
//!
//! Policy, in order:
//! 1. destructive plan without a confirmation token for that exact plan →
//!    needs confirmation;
//! 2. table or column outside the current schema → rejected;
//! 3. estimated mutation scope over the configured bounds → rejected;
//! 4. otherwise approved.
//!
//! `ApprovedPlan` can only be built here, and the executor accepts nothing
//! else, so no plan runs without an approved verdict.

use cq_protocol::{OperationPlan, PlanId, Schema, ValidationVerdict};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

pub const UNKNOWN_REFERENCE: &str = "unknown schema reference";
pub const SCOPE_EXCEEDED: &str = "scope exceeds safety bound";
pub const SCOPE_UNKNOWN: &str = "mutation scope could not be estimated";

/// Bounds on what one destructive plan may touch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyLimits {
    pub max_mutation_fraction: f64,
    pub max_mutation_rows: usize,
    pub max_columns_affected: usize,
}

impl From<&EngineConfig> for SafetyLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_mutation_fraction: config.max_mutation_fraction,
            max_mutation_rows: config.max_mutation_rows,
            max_columns_affected: config.max_columns_affected,
        }
    }
}

/// Dry-run estimate of what a plan would change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEstimate {
    pub rows_affected: usize,
    pub table_rows: usize,
    /// Whether the affected rows are deleted (vs rewritten in place).
    pub deletes_rows: bool,
    pub columns_affected: usize,
}

/// Explicit acknowledgment of one specific plan. It matches only a plan
/// that is structurally equal to the one it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationToken {
    plan: OperationPlan,
}

impl ConfirmationToken {
    pub fn for_plan(plan: &OperationPlan) -> Self {
        Self { plan: plan.clone() }
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan.id()
    }

    pub fn matches(&self, plan: &OperationPlan) -> bool {
        self.plan == *plan
    }
}

/// A plan that passed validation. Only `SafetyValidator::approve` builds
/// one.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedPlan {
    plan: OperationPlan,
}

impl ApprovedPlan {
    pub fn plan(&self) -> &OperationPlan {
        &self.plan
    }

    pub fn into_plan(self) -> OperationPlan {
        self.plan
    }
}

#[derive(Debug, Clone)]
pub struct SafetyValidator {
    limits: SafetyLimits,
}

impl SafetyValidator {
    pub fn new(limits: SafetyLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Full policy.
    pub fn validate(
        &self,
        plan: &OperationPlan,
        schema: &Schema,
        scope: Option<&ScopeEstimate>,
        token: Option<&ConfirmationToken>,
    ) -> ValidationVerdict {
        if plan.destructive && !token.is_some_and(|t| t.matches(plan)) {
            return ValidationVerdict::needs_confirmation(format!(
                "{} is destructive; confirm plan {} to proceed",
                plan.describe(),
                plan.id()
            ));
        }
        self.preflight(plan, schema, scope)
    }

    /// Rules 2 to 4 only, as if the plan were already confirmed. Run at
    /// submission so a plan that can never pass is not held for
    /// confirmation.
    pub fn preflight(
        &self,
        plan: &OperationPlan,
        schema: &Schema,
        scope: Option<&ScopeEstimate>,
    ) -> ValidationVerdict {
        if let Some(reference) = unknown_reference(plan, schema) {
            tracing::warn!(plan_id = %plan.id(), reference = %reference, "plan references unknown schema");
            return ValidationVerdict::rejected(UNKNOWN_REFERENCE);
        }
        if plan.destructive {
            let Some(scope) = scope else {
                return ValidationVerdict::rejected(SCOPE_UNKNOWN);
            };
            if self.exceeds(scope) {
                tracing::warn!(
                    plan_id = %plan.id(),
                    rows_affected = scope.rows_affected,
                    table_rows = scope.table_rows,
                    columns_affected = scope.columns_affected,
                    "plan exceeds mutation bound"
                );
                return ValidationVerdict::rejected(SCOPE_EXCEEDED);
            }
        }
        ValidationVerdict::Approved
    }

    /// Validate and, on approval, wrap the plan for execution. Any other
    /// verdict is returned as the error.
    pub fn approve(
        &self,
        plan: OperationPlan,
        schema: &Schema,
        scope: Option<&ScopeEstimate>,
        token: Option<&ConfirmationToken>,
    ) -> Result<ApprovedPlan, ValidationVerdict> {
        match self.validate(&plan, schema, scope, token) {
            ValidationVerdict::Approved => Ok(ApprovedPlan { plan }),
            other => Err(other),
        }
    }

    fn exceeds(&self, scope: &ScopeEstimate) -> bool {
        let l = &self.limits;
        if scope.rows_affected > l.max_mutation_rows {
            return true;
        }
        if scope.columns_affected > l.max_columns_affected {
            return true;
        }
        scope.deletes_rows
            && scope.table_rows > 1
            && scope.rows_affected as f64 > l.max_mutation_fraction * scope.table_rows as f64
    }
}

/// First table or column the plan names that the schema does not hold.
fn unknown_reference(plan: &OperationPlan, schema: &Schema) -> Option<String> {
    let Some(table) = schema.table(&plan.table) else {
        return Some(plan.table.clone());
    };
    plan.referenced_columns()
        .into_iter()
        .find(|c| !table.has_column(c))
        .map(|c| format!("{}.{c}", plan.table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_protocol::{
        ColumnDef, ColumnType, Comparison, Intent, Literal, Operation, Predicate, SemanticRole,
        TableSchema,
    };

    fn schema() -> Schema {
        let mut s = Schema::new();
        s.register(
            TableSchema::new(
                "patients",
                vec![
                    ColumnDef::new("patient_id", ColumnType::Text, SemanticRole::Identifier),
                    ColumnDef::new("age", ColumnType::Real, SemanticRole::Measurement),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        s
    }

    fn validator() -> SafetyValidator {
        SafetyValidator::new(SafetyLimits::from(&EngineConfig::default()))
    }

    fn drop_missing(column: &str) -> OperationPlan {
        OperationPlan::new(
            Intent::DropMissing,
            "patients",
            Operation::DropMissing {
                columns: vec![column.into()],
            },
        )
    }

    fn filter(column: &str) -> OperationPlan {
        OperationPlan::new(
            Intent::FilterRows,
            "patients",
            Operation::Filter {
                predicate: Predicate::Compare {
                    column: column.into(),
                    cmp: Comparison::Gt,
                    value: Literal::Integer(60),
                },
                columns: Vec::new(),
            },
        )
    }

    fn deletes(rows: usize, of: usize) -> ScopeEstimate {
        ScopeEstimate {
            rows_affected: rows,
            table_rows: of,
            deletes_rows: true,
            columns_affected: 0,
        }
    }

    #[test]
    fn read_only_plans_are_approved() {
        let v = validator().validate(&filter("age"), &schema(), None, None);
        assert_eq!(v, ValidationVerdict::Approved);
    }

    #[test]
    fn destructive_without_token_needs_confirmation() {
        let plan = drop_missing("age");
        let v = validator().validate(&plan, &schema(), Some(&deletes(2, 12)), None);
        assert_eq!(v.label(), "needs_confirmation");
        assert!(v.reason().unwrap().contains(&plan.id().0));
    }

    #[test]
    fn token_for_another_plan_does_not_count() {
        let plan = drop_missing("age");
        let other = ConfirmationToken::for_plan(&drop_missing("patient_id"));
        let v = validator().validate(&plan, &schema(), Some(&deletes(2, 12)), Some(&other));
        assert_eq!(v.label(), "needs_confirmation");

        let token = ConfirmationToken::for_plan(&plan);
        assert_eq!(token.plan_id(), plan.id());
        let v = validator().validate(&plan, &schema(), Some(&deletes(2, 12)), Some(&token));
        assert_eq!(v, ValidationVerdict::Approved);
    }

    #[test]
    fn unknown_column_is_never_approved() {
        let v = validator().validate(&filter("weight"), &schema(), None, None);
        assert_eq!(v, ValidationVerdict::rejected(UNKNOWN_REFERENCE));

        let plan = drop_missing("weight");
        let token = ConfirmationToken::for_plan(&plan);
        let v = validator().validate(&plan, &schema(), Some(&deletes(0, 12)), Some(&token));
        assert_eq!(v, ValidationVerdict::rejected(UNKNOWN_REFERENCE));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let mut plan = filter("age");
        plan.table = "visits".into();
        let v = validator().validate(&plan, &schema(), None, None);
        assert_eq!(v, ValidationVerdict::rejected(UNKNOWN_REFERENCE));
    }

    #[test]
    fn deleting_most_of_a_table_is_out_of_scope() {
        let plan = drop_missing("age");
        let token = ConfirmationToken::for_plan(&plan);
        let v = validator().validate(&plan, &schema(), Some(&deletes(7, 12)), Some(&token));
        assert_eq!(v, ValidationVerdict::rejected(SCOPE_EXCEEDED));
        let v = validator().validate(&plan, &schema(), Some(&deletes(6, 12)), Some(&token));
        assert!(v.is_approved());
    }

    #[test]
    fn single_row_tables_may_be_emptied() {
        let plan = drop_missing("age");
        let token = ConfirmationToken::for_plan(&plan);
        let v = validator().validate(&plan, &schema(), Some(&deletes(1, 1)), Some(&token));
        assert!(v.is_approved());
    }

    #[test]
    fn rewrites_are_bounded_by_absolute_rows_and_columns() {
        let plan = OperationPlan::new(
            Intent::Normalize,
            "patients",
            Operation::Normalize {
                column: "age".into(),
            },
        );
        let token = ConfirmationToken::for_plan(&plan);
        let mut scope = ScopeEstimate {
            rows_affected: 12,
            table_rows: 12,
            deletes_rows: false,
            columns_affected: 1,
        };
        assert!(validator()
            .validate(&plan, &schema(), Some(&scope), Some(&token))
            .is_approved());

        scope.columns_affected = 2;
        assert_eq!(
            validator().validate(&plan, &schema(), Some(&scope), Some(&token)),
            ValidationVerdict::rejected(SCOPE_EXCEEDED)
        );

        scope.columns_affected = 1;
        scope.rows_affected = 10_001;
        scope.table_rows = 20_000;
        assert_eq!(
            validator().validate(&plan, &schema(), Some(&scope), Some(&token)),
            ValidationVerdict::rejected(SCOPE_EXCEEDED)
        );
    }

    #[test]
    fn destructive_without_estimate_is_rejected() {
        let plan = drop_missing("age");
        let token = ConfirmationToken::for_plan(&plan);
        let v = validator().validate(&plan, &schema(), None, Some(&token));
        assert_eq!(v, ValidationVerdict::rejected(SCOPE_UNKNOWN));
    }

    #[test]
    fn approve_wraps_only_approved_plans() {
        let plan = drop_missing("age");
        let err = validator()
            .approve(plan.clone(), &schema(), Some(&deletes(1, 12)), None)
            .unwrap_err();
        assert_eq!(err.label(), "needs_confirmation");

        let token = ConfirmationToken::for_plan(&plan);
        let approved = validator()
            .approve(plan.clone(), &schema(), Some(&deletes(1, 12)), Some(&token))
            .unwrap();
        assert_eq!(approved.plan(), &plan);
    }
}
