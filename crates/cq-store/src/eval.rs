//! Predicate evaluation over stored rows.

use std::cmp::Ordering;

use cq_protocol::{parse_any_date, ColumnType, Comparison, Literal, Predicate, Row, TableSchema, Value};

use crate::error::{StoreError, StoreResult};

/// Evaluate `predicate` against one row of `schema`.
///
/// A null cell never satisfies a comparison or range, so the complement of
/// a comparison always contains the nulls.
pub fn matches(predicate: &Predicate, schema: &TableSchema, row: &Row) -> StoreResult<bool> {
    match predicate {
        Predicate::Compare { column, cmp, value } => {
            let (cell, ty) = cell(schema, row, column)?;
            Ok(match compare(cell, value, ty) {
                Some(ord) => satisfies(*cmp, ord),
                None => false,
            })
        }
        Predicate::Between { column, low, high } => {
            let (cell, ty) = cell(schema, row, column)?;
            let above = compare(cell, low, ty).is_some_and(|o| o != Ordering::Less);
            let below = compare(cell, high, ty).is_some_and(|o| o != Ordering::Greater);
            Ok(above && below)
        }
        Predicate::IsNull { column } => Ok(cell(schema, row, column)?.0.is_null()),
        Predicate::Not { inner } => Ok(!matches(inner, schema, row)?),
    }
}

/// Keep only rows matching `predicate`.
pub fn filter_rows(predicate: &Predicate, schema: &TableSchema, rows: &[Row]) -> StoreResult<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        if matches(predicate, schema, row)? {
            out.push(row.clone());
        }
    }
    Ok(out)
}

fn cell<'a>(schema: &TableSchema, row: &'a Row, column: &str) -> StoreResult<(&'a Value, ColumnType)> {
    let idx = schema.position(column).ok_or_else(|| StoreError::UnknownColumn {
        table: schema.name.clone(),
        column: column.to_string(),
    })?;
    let ty = schema.columns[idx].column_type;
    Ok((row.get(idx).unwrap_or(&Value::Null), ty))
}

fn satisfies(cmp: Comparison, ord: Ordering) -> bool {
    match cmp {
        Comparison::Gt => ord == Ordering::Greater,
        Comparison::Lt => ord == Ordering::Less,
        Comparison::Ge => ord != Ordering::Less,
        Comparison::Le => ord != Ordering::Greater,
        Comparison::Eq => ord == Ordering::Equal,
        Comparison::Ne => ord != Ordering::Equal,
    }
}

/// Order a cell against a literal under the column's declared type.
/// `None` means the two are incomparable (null cell, unparseable date,
/// mismatched kinds).
pub fn compare(cell: &Value, literal: &Literal, ty: ColumnType) -> Option<Ordering> {
    if cell.is_null() {
        return None;
    }
    match ty {
        ColumnType::Integer | ColumnType::Real => cell.as_f64()?.partial_cmp(&literal.as_f64()?),
        ColumnType::Date => {
            let lhs = parse_any_date(cell.as_str()?)?;
            let rhs = match literal {
                Literal::Date(d) => *d,
                Literal::Text(s) => parse_any_date(s)?,
                _ => return None,
            };
            Some(lhs.cmp(&rhs))
        }
        ColumnType::Boolean => match (cell, literal) {
            (Value::Bool(a), Literal::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        },
        ColumnType::Text => {
            let lhs = cell.as_str()?;
            let rhs = match literal {
                Literal::Text(s) => s.clone(),
                other => other.to_string(),
            };
            Some(lhs.to_lowercase().cmp(&rhs.to_lowercase()))
        }
    }
}
