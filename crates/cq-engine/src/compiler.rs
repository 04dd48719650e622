//! Plan compiler: a complete `ParameterSet` plus the schema becomes a typed
//! `OperationPlan`. Column names come out canonical and literals are coerced
//! to the column type, so downstream stages never re-check either.

use std::sync::LazyLock;

use cq_protocol::{
    parse_any_date, AggregateFn, ColumnDef, ColumnType, Comparison, DateFormat, Intent, Literal,
    Operation, OperationPlan, Operator, ParamRole, ParameterSet, Predicate, Schema, SemanticRole,
    TableSchema,
};
use regex::Regex;

use crate::error::{EngineError, EngineResult};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Compile parameters into a plan. Incomplete parameter sets are refused.
pub fn compile(params: &ParameterSet, schema: &Schema) -> EngineResult<OperationPlan> {
    let intent = params.intent;
    if !params.is_complete() {
        return Err(incomplete(params, params.missing.clone()));
    }
    let Some(table_name) = params.table_name() else {
        return Err(incomplete(params, vec![ParamRole::Table]));
    };
    let table = schema
        .table(table_name)
        .ok_or_else(|| EngineError::CompileUnknownReference {
            intent,
            reference: table_name.to_string(),
        })?;
    let c = Compiler {
        intent,
        params,
        table,
    };

    let operation = match intent {
        Intent::DropMissing => Operation::DropMissing {
            columns: c.columns_or_all()?,
        },
        Intent::ReplaceValue => {
            let col = c.one_column()?;
            let from = match params.values.first() {
                Some(v) => c.coerce(&v.value, col, false)?,
                None => return Err(incomplete(params, vec![ParamRole::Value])),
            };
            let to = match &params.replacement {
                Some(r) => c.coerce(&r.value, col, true)?,
                None => return Err(incomplete(params, vec![ParamRole::Replacement])),
            };
            Operation::ReplaceValue {
                column: col.name.clone(),
                from,
                to,
            }
        }
        Intent::FilterRows => Operation::Filter {
            predicate: c
                .predicate()?
                .ok_or_else(|| incomplete(params, vec![ParamRole::Operator]))?,
            columns: c.projection()?,
        },
        Intent::Count => Operation::Count {
            predicate: c.predicate()?,
            group_by: c.group_by()?,
        },
        Intent::Standardize => {
            let col = c.one_column()?;
            if col.column_type != ColumnType::Date {
                return Err(c.mismatch(col, "only date columns can be standardized"));
            }
            let Some(target) = &params.target_format else {
                return Err(incomplete(params, vec![ParamRole::TargetFormat]));
            };
            let format = DateFormat::from_alias(&target.value).ok_or_else(|| {
                EngineError::CompileInvalid {
                    intent,
                    reason: format!("unsupported date format '{}'", target.value),
                }
            })?;
            Operation::Standardize {
                column: col.name.clone(),
                format,
            }
        }
        Intent::RenameColumn => {
            let col = c.one_column()?;
            let Some(new_name) = &params.new_name else {
                return Err(incomplete(params, vec![ParamRole::NewName]));
            };
            let to = new_name.value.trim();
            if !IDENTIFIER.is_match(to) {
                return Err(EngineError::CompileInvalid {
                    intent,
                    reason: format!("'{to}' is not a valid column name"),
                });
            }
            if let Some(existing) = table.column(to) {
                if !existing.name.eq_ignore_ascii_case(&col.name) || existing.name == to {
                    return Err(EngineError::CompileInvalid {
                        intent,
                        reason: format!("column '{to}' already exists in {}", table.name),
                    });
                }
            }
            Operation::RenameColumn {
                from: col.name.clone(),
                to: to.to_string(),
            }
        }
        Intent::DropDuplicates => Operation::DropDuplicates {
            subset: c.canonical_columns()?,
        },
        Intent::Aggregate => {
            let col = c.one_column()?;
            let Some(function) = params.aggregation.as_ref().map(|a| a.value) else {
                return Err(incomplete(params, vec![ParamRole::AggregationFn]));
            };
            if function != AggregateFn::Count
                && !(col.column_type.is_numeric() && col.role == SemanticRole::Measurement)
            {
                return Err(c.mismatch(
                    col,
                    &format!("{function} needs a numeric measurement column"),
                ));
            }
            Operation::Aggregate {
                column: col.name.clone(),
                function,
                group_by: c.group_by()?,
            }
        }
        Intent::Normalize => {
            let col = c.one_column()?;
            if col.column_type != ColumnType::Real {
                return Err(c.mismatch(col, "min-max normalization needs a real-valued column"));
            }
            Operation::Normalize {
                column: col.name.clone(),
            }
        }
        Intent::Select => Operation::Select {
            columns: c.columns_or_all()?,
        },
        Intent::Unknown => {
            return Err(EngineError::CompileInvalid {
                intent,
                reason: "no operation was recognized".into(),
            });
        }
    };

    let plan = OperationPlan::new(intent, table.name.clone(), operation);
    tracing::debug!(plan = %plan.describe(), "compiled plan");
    Ok(plan)
}

fn incomplete(params: &ParameterSet, missing: Vec<ParamRole>) -> EngineError {
    EngineError::ExtractionIncomplete {
        intent: params.intent,
        missing,
        params: Box::new(params.clone()),
    }
}

/// A whole float as `i64`, or `None` when it falls outside the range.
/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn whole(x: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (x.fract() == 0.0 && (-LIMIT..LIMIT).contains(&x)).then_some(x as i64)
}

struct Compiler<'a> {
    intent: Intent,
    params: &'a ParameterSet,
    table: &'a TableSchema,
}

impl<'a> Compiler<'a> {
    fn column(&self, name: &str) -> EngineResult<&'a ColumnDef> {
        self.table
            .column(name)
            .ok_or_else(|| EngineError::CompileUnknownReference {
                intent: self.intent,
                reference: format!("{}.{name}", self.table.name),
            })
    }

    fn canonical_columns(&self) -> EngineResult<Vec<String>> {
        self.params
            .columns
            .iter()
            .map(|c| self.column(&c.value).map(|d| d.name.clone()))
            .collect()
    }

    /// Named columns, or every column of the table when none was named.
    fn columns_or_all(&self) -> EngineResult<Vec<String>> {
        if self.params.columns.is_empty() {
            Ok(self.table.column_names())
        } else {
            self.canonical_columns()
        }
    }

    fn projection(&self) -> EngineResult<Vec<String>> {
        self.params
            .projection
            .iter()
            .map(|c| self.column(&c.value).map(|d| d.name.clone()))
            .collect()
    }

    fn one_column(&self) -> EngineResult<&'a ColumnDef> {
        match self.params.columns.as_slice() {
            [] => Err(incomplete(self.params, vec![ParamRole::Column])),
            [only] => self.column(&only.value),
            many => Err(EngineError::CompileInvalid {
                intent: self.intent,
                reason: format!(
                    "{} takes one column, got {}",
                    self.intent,
                    many.iter()
                        .map(|c| c.value.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }),
        }
    }

    fn group_by(&self) -> EngineResult<Option<String>> {
        self.params
            .group_by
            .as_ref()
            .map(|g| self.column(&g.value).map(|d| d.name.clone()))
            .transpose()
    }

    fn mismatch(&self, col: &ColumnDef, detail: &str) -> EngineError {
        EngineError::CompileTypeMismatch {
            intent: self.intent,
            column: col.name.clone(),
            column_type: col.column_type,
            detail: detail.to_string(),
        }
    }

    /// Predicate from column, operator and operand(s), negated when the
    /// instruction said so; `None` when no operator was extracted.
    fn predicate(&self) -> EngineResult<Option<Predicate>> {
        let Some(op) = self.params.operator.as_ref().map(|o| o.value) else {
            return Ok(None);
        };
        let predicate = self.comparison(op)?;
        Ok(Some(if self.params.negated {
            predicate.negate()
        } else {
            predicate
        }))
    }

    fn comparison(&self, op: Operator) -> EngineResult<Predicate> {
        let col = self.one_column()?;
        let column = col.name.clone();
        let ordered = matches!(
            col.column_type,
            ColumnType::Integer | ColumnType::Real | ColumnType::Date
        );
        if op.is_ordering() && !ordered {
            return Err(self.mismatch(
                col,
                &format!("'{op}' needs a numeric or date column"),
            ));
        }

        if op == Operator::Between {
            let [low, high] = self.params.values.as_slice() else {
                return Err(incomplete(self.params, vec![ParamRole::Value]));
            };
            let low = self.coerce(&low.value, col, false)?;
            let high = self.coerce(&high.value, col, false)?;
            if low == Literal::Null || high == Literal::Null {
                return Err(self.mismatch(col, "between needs two non-null bounds"));
            }
            return Ok(Predicate::Between { column, low, high });
        }

        let Some(value) = self.params.values.first() else {
            return Err(incomplete(self.params, vec![ParamRole::Value]));
        };
        let value = self.coerce(&value.value, col, false)?;
        let predicate = match (op, value) {
            (Operator::Eq, Literal::Null) => Predicate::IsNull { column },
            (Operator::Ne, Literal::Null) => Predicate::IsNull { column }.negate(),
            (_, Literal::Null) => {
                return Err(self.mismatch(col, &format!("'{op}' cannot compare with null")));
            }
            (op, value) => {
                let cmp = Comparison::from_operator(op).ok_or_else(|| EngineError::CompileInvalid {
                    intent: self.intent,
                    reason: format!("operator '{op}' takes two operands"),
                })?;
                Predicate::Compare { column, cmp, value }
            }
        };
        Ok(predicate)
    }

    /// Coerce a literal to the column type. `write` is set for values that
    /// will be stored, which must fit the column exactly.
    fn coerce(&self, lit: &Literal, col: &ColumnDef, write: bool) -> EngineResult<Literal> {
        let fail = || {
            self.mismatch(
                col,
                &format!("{} value '{lit}' does not fit", lit.kind()),
            )
        };
        let out = match (col.column_type, lit) {
            (_, Literal::Null) => Literal::Null,
            (ColumnType::Integer | ColumnType::Real, Literal::Real(x)) if !x.is_finite() => {
                return Err(fail());
            }

            (ColumnType::Text, Literal::Text(s)) => Literal::Text(s.clone()),
            (ColumnType::Text, Literal::Date(d)) => Literal::Text(d.format("%Y-%m-%d").to_string()),
            (ColumnType::Text, other) => Literal::Text(other.to_string()),

            (ColumnType::Integer, Literal::Integer(n)) => Literal::Integer(*n),
            (ColumnType::Integer, Literal::Real(x)) if x.fract() == 0.0 => match whole(*x) {
                Some(n) => Literal::Integer(n),
                None => return Err(fail()),
            },
            (ColumnType::Integer, Literal::Real(x)) if !write => Literal::Real(*x),
            (ColumnType::Integer, Literal::Text(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Literal::Integer(n),
                Err(_) => return Err(fail()),
            },

            (ColumnType::Real, Literal::Integer(n)) => Literal::Real(*n as f64),
            (ColumnType::Real, Literal::Real(x)) => Literal::Real(*x),
            (ColumnType::Real, Literal::Text(s)) => match s.trim().parse::<f64>() {
                Ok(x) if x.is_finite() => Literal::Real(x),
                _ => return Err(fail()),
            },

            (ColumnType::Date, Literal::Date(d)) => Literal::Date(*d),
            (ColumnType::Date, Literal::Text(s)) => match parse_any_date(s) {
                Some(d) => Literal::Date(d),
                None => return Err(fail()),
            },

            (ColumnType::Boolean, Literal::Boolean(b)) => Literal::Boolean(*b),
            (ColumnType::Boolean, Literal::Integer(n)) if *n == 0 || *n == 1 => {
                Literal::Boolean(*n == 1)
            }
            (ColumnType::Boolean, Literal::Text(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "t" => Literal::Boolean(true),
                "false" | "no" | "n" | "f" => Literal::Boolean(false),
                _ => return Err(fail()),
            },

            _ => return Err(fail()),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_protocol::{Extracted, SchemaChange, Span};

    fn schema() -> Schema {
        let mut s = Schema::new();
        s.register(
            TableSchema::new(
                "patients",
                vec![
                    ColumnDef::new("patient_id", ColumnType::Text, SemanticRole::Identifier),
                    ColumnDef::new("age", ColumnType::Real, SemanticRole::Measurement),
                    ColumnDef::new("gender", ColumnType::Text, SemanticRole::Category),
                    ColumnDef::new("enrollment_date", ColumnType::Date, SemanticRole::Timestamp),
                    ColumnDef::new("site_id", ColumnType::Text, SemanticRole::Category),
                    ColumnDef::new("visits", ColumnType::Integer, SemanticRole::Measurement),
                    ColumnDef::new("consented", ColumnType::Boolean, SemanticRole::Category),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        s
    }

    fn span() -> Span {
        Span::new(0, 1)
    }

    fn params(intent: Intent, columns: &[&str]) -> ParameterSet {
        let mut p = ParameterSet::new(intent);
        p.table = Some(Extracted::at("patients".to_string(), span()));
        p.columns = columns
            .iter()
            .map(|c| Extracted::at(c.to_string(), span()))
            .collect();
        p
    }

    fn filter(column: &str, op: Operator, values: &[Literal]) -> ParameterSet {
        let mut p = params(Intent::FilterRows, &[column]);
        p.operator = Some(Extracted::at(op, span()));
        p.values = values
            .iter()
            .cloned()
            .map(|v| Extracted::at(v, span()))
            .collect();
        p
    }

    #[test]
    fn filter_uses_canonical_names_and_coerces() {
        let plan = compile(&filter("AGE", Operator::Gt, &[Literal::Integer(60)]), &schema()).unwrap();
        assert_eq!(plan.table, "patients");
        assert!(!plan.destructive);
        assert_eq!(
            plan.operation,
            Operation::Filter {
                predicate: Predicate::Compare {
                    column: "age".into(),
                    cmp: Comparison::Gt,
                    value: Literal::Real(60.0),
                },
                columns: Vec::new(),
            }
        );
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let plan = compile(&filter("age", Operator::Eq, &[Literal::Null]), &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::Filter {
                predicate: Predicate::IsNull {
                    column: "age".into()
                },
                columns: Vec::new(),
            }
        );
        let plan = compile(&filter("age", Operator::Ne, &[Literal::Null]), &schema()).unwrap();
        assert!(matches!(
            plan.operation,
            Operation::Filter {
                predicate: Predicate::Not { .. },
                ..
            }
        ));
    }

    #[test]
    fn negated_filter_wraps_the_predicate() {
        let mut p = filter("age", Operator::Gt, &[Literal::Integer(60)]);
        p.negated = true;
        let plan = compile(&p, &schema()).unwrap();
        let Operation::Filter { predicate, .. } = plan.operation else {
            panic!("expected filter");
        };
        assert_eq!(
            predicate,
            Predicate::Compare {
                column: "age".into(),
                cmp: Comparison::Gt,
                value: Literal::Real(60.0),
            }
            .negate()
        );

        // "age is not missing" said negatively is a plain null test.
        let mut p = filter("age", Operator::Ne, &[Literal::Null]);
        p.negated = true;
        let plan = compile(&p, &schema()).unwrap();
        assert!(matches!(
            plan.operation,
            Operation::Filter { predicate: Predicate::IsNull { .. }, .. }
        ));
    }

    #[test]
    fn filter_projection_is_canonical() {
        let mut p = filter("gender", Operator::Eq, &[Literal::Text("F".into())]);
        p.projection = vec![
            Extracted::at("Patient_ID".to_string(), span()),
            Extracted::at("age".to_string(), span()),
        ];
        let plan = compile(&p, &schema()).unwrap();
        let Operation::Filter { columns, .. } = &plan.operation else {
            panic!("expected filter");
        };
        assert_eq!(columns, &["patient_id", "age"]);

        p.projection.push(Extracted::at("weight".to_string(), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_unknown_reference");
    }

    #[test]
    fn ordering_on_text_is_a_type_mismatch() {
        let err = compile(
            &filter("gender", Operator::Gt, &[Literal::Text("M".into())]),
            &schema(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::CompileTypeMismatch { ref column, .. } if column == "gender"));
    }

    #[test]
    fn unparseable_date_operand_is_rejected() {
        let err = compile(
            &filter("enrollment_date", Operator::Lt, &[Literal::Text("soon".into())]),
            &schema(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "compile_type_mismatch");
    }

    #[test]
    fn between_orders_bounds_as_given() {
        let plan = compile(
            &filter(
                "age",
                Operator::Between,
                &[Literal::Integer(40), Literal::Integer(50)],
            ),
            &schema(),
        )
        .unwrap();
        assert_eq!(
            plan.operation,
            Operation::Filter {
                predicate: Predicate::Between {
                    column: "age".into(),
                    low: Literal::Real(40.0),
                    high: Literal::Real(50.0),
                },
                columns: Vec::new(),
            }
        );
    }

    #[test]
    fn unknown_column_is_unknown_reference() {
        let err = compile(&filter("weight", Operator::Gt, &[Literal::Integer(1)]), &schema())
            .unwrap_err();
        match err {
            EngineError::CompileUnknownReference { reference, .. } => {
                assert_eq!(reference, "patients.weight")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn incomplete_params_are_refused() {
        let mut p = params(Intent::FilterRows, &["age"]);
        p.mark_missing(ParamRole::Operator);
        let err = compile(&p, &schema()).unwrap_err();
        assert_eq!(err.kind(), "extraction_incomplete");
    }

    #[test]
    fn drop_missing_without_columns_covers_all() {
        let plan = compile(&params(Intent::DropMissing, &[]), &schema()).unwrap();
        assert!(plan.destructive);
        match plan.operation {
            Operation::DropMissing { columns } => assert_eq!(columns.len(), 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn replace_checks_the_written_type() {
        let mut p = params(Intent::ReplaceValue, &["visits"]);
        p.values.push(Extracted::at(Literal::Null, span()));
        p.replacement = Some(Extracted::at(Literal::Real(2.5), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_type_mismatch");

        p.replacement = Some(Extracted::at(Literal::Integer(0), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::ReplaceValue {
                column: "visits".into(),
                from: Literal::Null,
                to: Literal::Integer(0),
            }
        );
    }

    #[test]
    fn non_finite_numbers_never_reach_a_plan() {
        let mut p = params(Intent::ReplaceValue, &["age"]);
        p.values.push(Extracted::at(Literal::Text("nan".into()), span()));
        p.replacement = Some(Extracted::at(Literal::Integer(0), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_type_mismatch");

        for text in ["inf", "-Infinity"] {
            let err = compile(&filter("age", Operator::Gt, &[Literal::Text(text.into())]), &schema())
                .unwrap_err();
            assert_eq!(err.kind(), "compile_type_mismatch", "{text}");
        }
        let err = compile(&filter("visits", Operator::Lt, &[Literal::Real(f64::NAN)]), &schema())
            .unwrap_err();
        assert_eq!(err.kind(), "compile_type_mismatch");
    }

    #[test]
    fn integer_cast_refuses_out_of_range_floats() {
        let mut p = params(Intent::ReplaceValue, &["visits"]);
        p.values.push(Extracted::at(Literal::Null, span()));
        p.replacement = Some(Extracted::at(Literal::Real(1e19), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_type_mismatch");

        p.replacement = Some(Extracted::at(Literal::Real(-9_223_372_036_854_775_808.0), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert!(matches!(
            plan.operation,
            Operation::ReplaceValue { to: Literal::Integer(i64::MIN), .. }
        ));

        let plan = compile(&filter("visits", Operator::Ge, &[Literal::Real(3.0)]), &schema()).unwrap();
        assert!(matches!(
            plan.operation,
            Operation::Filter {
                predicate: Predicate::Compare { value: Literal::Integer(3), .. },
                ..
            }
        ));
    }

    #[test]
    fn boolean_words_coerce() {
        let mut p = params(Intent::ReplaceValue, &["consented"]);
        p.values.push(Extracted::at(Literal::Text("no".into()), span()));
        p.replacement = Some(Extracted::at(Literal::Text("Yes".into()), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::ReplaceValue {
                column: "consented".into(),
                from: Literal::Boolean(false),
                to: Literal::Boolean(true),
            }
        );
    }

    #[test]
    fn standardize_needs_known_format_and_date_column() {
        let mut p = params(Intent::Standardize, &["enrollment_date"]);
        p.target_format = Some(Extracted::at("YYYY-MM-DD".into(), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::Standardize {
                column: "enrollment_date".into(),
                format: DateFormat::Iso,
            }
        );

        p.target_format = Some(Extracted::at("%H:%M".into(), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_invalid");

        let mut q = params(Intent::Standardize, &["gender"]);
        q.target_format = Some(Extracted::at("iso".into(), span()));
        assert_eq!(compile(&q, &schema()).unwrap_err().kind(), "compile_type_mismatch");
    }

    #[test]
    fn rename_validates_new_name() {
        let mut p = params(Intent::RenameColumn, &["age"]);
        p.new_name = Some(Extracted::at("age years".into(), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_invalid");

        p.new_name = Some(Extracted::at("gender".into(), span()));
        assert_eq!(compile(&p, &schema()).unwrap_err().kind(), "compile_invalid");

        p.new_name = Some(Extracted::at("age_years".into(), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::RenameColumn {
                from: "age".into(),
                to: "age_years".into(),
            }
        );
        // The compiled rename applies cleanly to the schema.
        let mut s = schema();
        s.evolve(
            "patients",
            &SchemaChange::RenameColumn {
                from: "age".into(),
                to: "age_years".into(),
            },
        )
        .unwrap();
    }

    #[test]
    fn aggregate_requires_numeric_measurement() {
        let mut p = params(Intent::Aggregate, &["age"]);
        p.aggregation = Some(Extracted::at(AggregateFn::Mean, span()));
        p.group_by = Some(Extracted::at("SITE_ID".into(), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::Aggregate {
                column: "age".into(),
                function: AggregateFn::Mean,
                group_by: Some("site_id".into()),
            }
        );

        let mut q = params(Intent::Aggregate, &["patient_id"]);
        q.aggregation = Some(Extracted::at(AggregateFn::Sum, span()));
        assert_eq!(compile(&q, &schema()).unwrap_err().kind(), "compile_type_mismatch");

        q.aggregation = Some(Extracted::at(AggregateFn::Count, span()));
        assert!(compile(&q, &schema()).is_ok());
    }

    #[test]
    fn normalize_needs_real_column() {
        assert!(compile(&params(Intent::Normalize, &["age"]), &schema()).is_ok());
        assert_eq!(
            compile(&params(Intent::Normalize, &["visits"]), &schema())
                .unwrap_err()
                .kind(),
            "compile_type_mismatch"
        );
    }

    #[test]
    fn single_column_intents_refuse_several() {
        let err = compile(&params(Intent::Normalize, &["age", "visits"]), &schema()).unwrap_err();
        assert_eq!(err.kind(), "compile_invalid");
    }

    #[test]
    fn count_without_predicate() {
        let mut p = params(Intent::Count, &[]);
        p.group_by = Some(Extracted::at("site_id".into(), span()));
        let plan = compile(&p, &schema()).unwrap();
        assert_eq!(
            plan.operation,
            Operation::Count {
                predicate: None,
                group_by: Some("site_id".into()),
            }
        );
    }

    #[test]
    fn same_params_same_plan_id() {
        let a = compile(&filter("age", Operator::Gt, &[Literal::Integer(60)]), &schema()).unwrap();
        let b = compile(&filter("Age", Operator::Gt, &[Literal::Real(60.0)]), &schema()).unwrap();
        assert_eq!(a.id(), b.id());
    }
}
