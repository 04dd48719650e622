//! Per-table data-quality profile: missing values, duplicate rows,
//! out-of-range labs. Dataset-wide checks live in `checks`.

use std::collections::HashSet;

use cq_protocol::{Row, TableSchema};
use serde::{Deserialize, Serialize};

use crate::memory::TableData;

/// Lab tables are recognized by these three columns.
pub(crate) const LAB_VALUE: &str = "test_value";
pub(crate) const LAB_LOW: &str = "normal_range_low";
pub(crate) const LAB_HIGH: &str = "normal_range_high";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing: usize,
}

/// Quality snapshot of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub table: String,
    pub rows: usize,
    /// Null count per column, in column order.
    pub missing: Vec<ColumnMissing>,
    /// Rows that repeat an earlier row exactly.
    pub duplicate_rows: usize,
    /// Lab values outside their normal range; `None` for non-lab tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_of_range: Option<usize>,
}

impl QualityReport {
    pub fn missing_in(&self, column: &str) -> Option<usize> {
        self.missing
            .iter()
            .find(|m| m.column.eq_ignore_ascii_case(column))
            .map(|m| m.missing)
    }

    pub fn total_missing(&self) -> usize {
        self.missing.iter().map(|m| m.missing).sum()
    }
}

/// Profile a whole table.
pub fn profile(table: &TableData) -> QualityReport {
    let schema = &table.schema;
    let missing = schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| ColumnMissing {
            column: c.name.clone(),
            missing: table.rows.iter().filter(|r| r[i].is_null()).count(),
        })
        .collect();
    let all: Vec<usize> = (0..schema.columns.len()).collect();
    QualityReport {
        table: schema.name.clone(),
        rows: table.rows.len(),
        missing,
        duplicate_rows: duplicate_count(&table.rows, &all),
        out_of_range: out_of_range(schema, &table.rows),
    }
}

/// Rows with a null in any of the given column positions.
pub fn rows_with_missing(rows: &[Row], columns: &[usize]) -> usize {
    rows.iter()
        .filter(|r| columns.iter().any(|&i| r[i].is_null()))
        .count()
}

/// Rows that repeat an earlier row on the given column positions.
pub fn duplicate_count(rows: &[Row], columns: &[usize]) -> usize {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| {
            let key: Vec<String> = columns.iter().map(|&i| r[i].group_key()).collect();
            !seen.insert(key)
        })
        .count()
}

fn out_of_range(schema: &TableSchema, rows: &[Row]) -> Option<usize> {
    let v = schema.position(LAB_VALUE)?;
    let lo = schema.position(LAB_LOW)?;
    let hi = schema.position(LAB_HIGH)?;
    let count = rows
        .iter()
        .filter(|r| match (r[v].as_f64(), r[lo].as_f64(), r[hi].as_f64()) {
            (Some(x), Some(l), Some(h)) => x < l || x > h,
            _ => false,
        })
        .count();
    Some(count)
}
