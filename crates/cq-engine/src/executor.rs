//! Execution engine.
//!
//! Applies one approved plan per call through the `DataSource` trait. Every
//! destructive plan becomes exactly one `write_rows` mutation, which the
//! source applies all-or-nothing. Calls against the same table serialize on
//! a per-table lock held by the caller for the whole estimate/validate/apply
//! sequence.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use cq_protocol::{
    parse_any_date, AggregateFn, ChangeSummary, Comparison, Operation, OperationPlan, Predicate,
    ResultSet, Row, TableSchema, Value,
};
use cq_store::quality::{duplicate_count, rows_with_missing};
use cq_store::{eval, DataSource, Mutation, RowFilter, StoreError};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{EngineError, EngineResult};
use crate::safety::{ApprovedPlan, ScopeEstimate};

/// Exclusive hold on one table. Dropping it releases the table.
pub struct TableGuard {
    table: String,
    _guard: OwnedMutexGuard<()>,
}

impl TableGuard {
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Output of one executed plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub result: ResultSet,
    pub summary: ChangeSummary,
}

pub struct Executor {
    source: Arc<dyn DataSource>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    row_limit: usize,
}

impl Executor {
    pub fn new(source: Arc<dyn DataSource>, row_limit: usize) -> Self {
        Self {
            source,
            locks: Mutex::new(HashMap::new()),
            row_limit,
        }
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Wait for exclusive access to `table`.
    pub async fn lock(&self, table: &str) -> TableGuard {
        let key = table.to_lowercase();
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        TableGuard {
            table: key,
            _guard: lock.lock_owned().await,
        }
    }

    /// Dry run: what the plan would change, computed against current data
    /// without mutating it.
    pub async fn estimate(&self, plan: &OperationPlan) -> EngineResult<ScopeEstimate> {
        let (schema, rows) = self.load(&plan.table).await?;
        let table_rows = rows.len();
        let scope = match &plan.operation {
            Operation::DropMissing { columns } => ScopeEstimate {
                rows_affected: rows_with_missing(&rows, &positions(&schema, columns)?),
                table_rows,
                deletes_rows: true,
                columns_affected: 0,
            },
            Operation::DropDuplicates { subset } => ScopeEstimate {
                rows_affected: duplicate_count(&rows, &positions(&schema, subset)?),
                table_rows,
                deletes_rows: true,
                columns_affected: 0,
            },
            Operation::ReplaceValue { from, .. } => {
                let predicate = replace_predicate(plan, from)?;
                let mut hits = 0;
                for row in &rows {
                    if eval::matches(&predicate, &schema, row)? {
                        hits += 1;
                    }
                }
                ScopeEstimate {
                    rows_affected: hits,
                    table_rows,
                    deletes_rows: false,
                    columns_affected: 1,
                }
            }
            Operation::Standardize { column, .. } | Operation::Normalize { column } => {
                let i = position(&schema, column)?;
                let values = rewrite(&plan.operation, i, &rows);
                ScopeEstimate {
                    rows_affected: changed(&rows, i, &values),
                    table_rows,
                    deletes_rows: false,
                    columns_affected: 1,
                }
            }
            Operation::RenameColumn { .. } => ScopeEstimate {
                rows_affected: 0,
                table_rows,
                deletes_rows: false,
                columns_affected: 1,
            },
            Operation::Filter { .. }
            | Operation::Aggregate { .. }
            | Operation::Select { .. }
            | Operation::Count { .. } => ScopeEstimate {
                table_rows,
                ..ScopeEstimate::default()
            },
        };
        Ok(scope)
    }

    /// Apply an approved plan. The caller must hold the plan's table.
    pub async fn execute(&self, approved: &ApprovedPlan, guard: &TableGuard) -> EngineResult<Execution> {
        let plan = approved.plan();
        if !guard.table().eq_ignore_ascii_case(&plan.table) {
            return Err(StoreError::Conflict(format!(
                "holding table {} while executing against {}",
                guard.table(),
                plan.table
            ))
            .into());
        }
        let table = plan.table.as_str();
        let (schema, rows) = self.load(table).await?;
        let rows_before = rows.len();
        let mut summary = ChangeSummary {
            rows_before,
            rows_after: rows_before,
            description: plan.describe(),
            ..ChangeSummary::default()
        };

        let result = match &plan.operation {
            Operation::Filter { predicate, columns } => {
                let hits = eval::filter_rows(predicate, &schema, &rows)?;
                if columns.is_empty() {
                    ResultSet::new(schema.column_names(), hits)
                } else {
                    let idx = positions(&schema, columns)?;
                    ResultSet::new(names(&schema, &idx), project(&hits, &idx))
                }
            }
            Operation::Select { columns } => {
                let idx = positions(&schema, columns)?;
                ResultSet::new(names(&schema, &idx), project(&rows, &idx))
            }
            Operation::Count {
                predicate,
                group_by,
            } => {
                let hits = match predicate {
                    Some(p) => eval::filter_rows(p, &schema, &rows)?,
                    None => rows,
                };
                match group_by {
                    Some(g) => {
                        let gi = position(&schema, g)?;
                        let out = grouped(&hits, gi)
                            .into_iter()
                            .map(|(key, members)| vec![key, Value::Int(members.len() as i64)])
                            .collect();
                        ResultSet::new(vec![schema.columns[gi].name.clone(), "count".into()], out)
                    }
                    None => ResultSet::new(vec!["count".into()], vec![vec![Value::Int(hits.len() as i64)]]),
                }
            }
            Operation::Aggregate {
                column,
                function,
                group_by,
            } => {
                let ci = position(&schema, column)?;
                let label = format!("{function}_{}", schema.columns[ci].name);
                match group_by {
                    Some(g) => {
                        let gi = position(&schema, g)?;
                        let out = grouped(&rows, gi)
                            .into_iter()
                            .map(|(key, members)| vec![key, aggregate(*function, &members, ci)])
                            .collect();
                        ResultSet::new(vec![schema.columns[gi].name.clone(), label], out)
                    }
                    None => {
                        let all: Vec<&Row> = rows.iter().collect();
                        ResultSet::new(vec![label], vec![vec![aggregate(*function, &all, ci)]])
                    }
                }
            }

            Operation::DropMissing { columns } => {
                let idx = positions(&schema, columns)?;
                summary.missing_before = Some(rows_with_missing(&rows, &idx));
                summary.rows_affected = self
                    .write(table, &Mutation::DeleteMissing {
                        columns: columns.clone(),
                    })
                    .await?;
                let (_, after) = self.load(table).await?;
                summary.rows_after = after.len();
                summary.missing_after = Some(rows_with_missing(&after, &idx));
                ResultSet::empty()
            }
            Operation::DropDuplicates { subset } => {
                let idx = positions(&schema, subset)?;
                summary.duplicates_before = Some(duplicate_count(&rows, &idx));
                summary.rows_affected = self
                    .write(table, &Mutation::DeleteDuplicates {
                        subset: subset.clone(),
                    })
                    .await?;
                let (_, after) = self.load(table).await?;
                summary.rows_after = after.len();
                summary.duplicates_after = Some(duplicate_count(&after, &idx));
                ResultSet::empty()
            }
            Operation::ReplaceValue { column, from, to } => {
                let i = position(&schema, column)?;
                summary.columns_affected = vec![schema.columns[i].name.clone()];
                summary.missing_before = Some(rows_with_missing(&rows, &[i]));
                summary.rows_affected = self
                    .write(table, &Mutation::UpdateWhere {
                        column: column.clone(),
                        predicate: replace_predicate(plan, from)?,
                        value: Value::from(to),
                    })
                    .await?;
                let (_, after) = self.load(table).await?;
                summary.missing_after = Some(rows_with_missing(&after, &[i]));
                ResultSet::empty()
            }
            Operation::Standardize { column, .. } | Operation::Normalize { column } => {
                let i = position(&schema, column)?;
                summary.columns_affected = vec![schema.columns[i].name.clone()];
                summary.missing_before = Some(rows_with_missing(&rows, &[i]));
                let values = rewrite(&plan.operation, i, &rows);
                summary.rows_affected = self
                    .write(table, &Mutation::RewriteColumn {
                        column: column.clone(),
                        values,
                    })
                    .await?;
                let (_, after) = self.load(table).await?;
                summary.missing_after = Some(rows_with_missing(&after, &[i]));
                ResultSet::empty()
            }
            Operation::RenameColumn { from, to } => {
                self.write(table, &Mutation::RenameColumn {
                    from: from.clone(),
                    to: to.clone(),
                })
                .await?;
                summary.columns_affected = vec![from.clone(), to.clone()];
                ResultSet::empty()
            }
        };

        tracing::info!(
            table,
            intent = %plan.intent,
            rows_returned = result.total_rows,
            rows_affected = summary.rows_affected,
            "plan executed"
        );
        Ok(Execution {
            result: result.limited(self.row_limit),
            summary,
        })
    }

    async fn load(&self, table: &str) -> EngineResult<(TableSchema, Vec<Row>)> {
        let schema = self.source.get_schema(table).await?;
        let rows = self.source.read_rows(table, &RowFilter::All).await?;
        Ok((schema, rows))
    }

    async fn write(&self, table: &str, mutation: &Mutation) -> EngineResult<usize> {
        self.source.write_rows(table, mutation).await.map_err(|e| {
            tracing::warn!(table, error = %e, "mutation failed; table left unchanged");
            EngineError::Execution(e)
        })
    }
}

fn position(schema: &TableSchema, column: &str) -> Result<usize, StoreError> {
    schema.position(column).ok_or_else(|| StoreError::UnknownColumn {
        table: schema.name.clone(),
        column: column.to_string(),
    })
}

fn positions(schema: &TableSchema, columns: &[String]) -> Result<Vec<usize>, StoreError> {
    if columns.is_empty() {
        return Ok((0..schema.columns.len()).collect());
    }
    columns.iter().map(|c| position(schema, c)).collect()
}

fn names(schema: &TableSchema, idx: &[usize]) -> Vec<String> {
    idx.iter().map(|&i| schema.columns[i].name.clone()).collect()
}

fn project(rows: &[Row], idx: &[usize]) -> Vec<Row> {
    rows.iter()
        .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
        .collect()
}

fn replace_predicate(plan: &OperationPlan, from: &cq_protocol::Literal) -> EngineResult<Predicate> {
    let Operation::ReplaceValue { column, .. } = &plan.operation else {
        return Err(EngineError::CompileInvalid {
            intent: plan.intent,
            reason: "not a replace plan".into(),
        });
    };
    Ok(match from {
        cq_protocol::Literal::Null => Predicate::IsNull {
            column: column.clone(),
        },
        value => Predicate::Compare {
            column: column.clone(),
            cmp: Comparison::Eq,
            value: value.clone(),
        },
    })
}

/// New cell values for an in-place column rewrite.
fn rewrite(op: &Operation, i: usize, rows: &[Row]) -> Vec<Value> {
    match op {
        Operation::Standardize { format, .. } => rows
            .iter()
            .map(|r| match &r[i] {
                Value::Text(s) => match parse_any_date(s) {
                    Some(d) => Value::Text(format.format(d)),
                    None => r[i].clone(),
                },
                other => other.clone(),
            })
            .collect(),
        Operation::Normalize { .. } => {
            let nums: Vec<f64> = rows.iter().filter_map(|r| r[i].as_f64()).collect();
            let min = nums.iter().copied().fold(f64::INFINITY, f64::min);
            let max = nums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let span = max - min;
            rows.iter()
                .map(|r| match r[i].as_f64() {
                    Some(_) if span == 0.0 => Value::Real(0.0),
                    Some(x) => Value::Real((x - min) / span),
                    None => r[i].clone(),
                })
                .collect()
        }
        _ => rows.iter().map(|r| r[i].clone()).collect(),
    }
}

fn changed(rows: &[Row], i: usize, values: &[Value]) -> usize {
    rows.iter().zip(values).filter(|(r, v)| r[i] != **v).count()
}

/// Rows grouped by the value at `gi`, groups sorted by key.
fn grouped(rows: &[Row], gi: usize) -> Vec<(Value, Vec<&Row>)> {
    let mut groups: HashMap<String, (Value, Vec<&Row>)> = HashMap::new();
    for row in rows {
        groups
            .entry(row[gi].group_key())
            .or_insert_with(|| (row[gi].clone(), Vec::new()))
            .1
            .push(row);
    }
    let mut out: Vec<(Value, Vec<&Row>)> = groups.into_values().collect();
    out.sort_by(|a, b| order_values(&a.0, &b.0));
    out
}

/// Total order for group keys: nulls first, then booleans, numbers, text.
fn order_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Real(_) => 2,
            Value::Text(_) => 3,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

/// Aggregate over the non-null cells of column `ci`. Empty input yields
/// null, except `count` which yields 0.
fn aggregate(function: AggregateFn, rows: &[&Row], ci: usize) -> Value {
    if function == AggregateFn::Count {
        return Value::Int(rows.iter().filter(|r| !r[ci].is_null()).count() as i64);
    }
    let mut nums: Vec<f64> = rows.iter().filter_map(|r| r[ci].as_f64()).collect();
    if nums.is_empty() {
        return Value::Null;
    }
    let n = nums.len() as f64;
    let x = match function {
        AggregateFn::Mean => nums.iter().sum::<f64>() / n,
        AggregateFn::Sum => nums.iter().sum(),
        AggregateFn::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateFn::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateFn::Median => {
            nums.sort_by(f64::total_cmp);
            let mid = nums.len() / 2;
            if nums.len() % 2 == 0 {
                (nums[mid - 1] + nums[mid]) / 2.0
            } else {
                nums[mid]
            }
        }
        AggregateFn::Count => n,
    };
    Value::Real(x)
}
