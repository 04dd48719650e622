//! Data-source abstraction: the only way the engine touches stored rows.

use async_trait::async_trait;
use cq_protocol::{ColumnDef, Predicate, Row, TableSchema, Value};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Which rows `read_rows` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum RowFilter {
    All,
    Where { predicate: Predicate },
}

/// A structured write. Adapters translate these into their backend's
/// native form; each is applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mutation", rename_all = "snake_case")]
pub enum Mutation {
    /// Delete rows with a null in any of `columns`.
    DeleteMissing { columns: Vec<String> },
    /// Delete every row after the first in each group of rows that agree on
    /// `subset` (all columns when empty).
    DeleteDuplicates { subset: Vec<String> },
    /// Set `column` to `value` on rows matching `predicate`.
    UpdateWhere {
        column: String,
        predicate: Predicate,
        value: Value,
    },
    /// Replace every cell of `column`, positionally. `values` must have one
    /// entry per current row.
    RewriteColumn { column: String, values: Vec<Value> },
    RenameColumn { from: String, to: String },
    /// Append a column, null in every existing row.
    AddColumn { column: ColumnDef },
    InsertRows { rows: Vec<Row> },
}

/// Abstraction over tabular storage.
///
/// The engine holds a `dyn DataSource`, so tests run against `MemoryStore`
/// and deployments can swap in another backend.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Rows of `table` matching `filter`, in storage order.
    async fn read_rows(&self, table: &str, filter: &RowFilter) -> StoreResult<Vec<Row>>;

    /// Apply `mutation` to `table` and return the number of rows it touched.
    async fn write_rows(&self, table: &str, mutation: &Mutation) -> StoreResult<usize>;

    /// Current structure of `table` as the backend sees it.
    async fn get_schema(&self, table: &str) -> StoreResult<TableSchema>;

    /// Names of all tables the source holds.
    async fn list_tables(&self) -> StoreResult<Vec<String>>;
}
