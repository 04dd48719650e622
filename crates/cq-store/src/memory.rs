//! In-memory tabular store, seeded from code or a JSON snapshot.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use cq_protocol::{Row, TableSchema, Value};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::eval;
use crate::source::{DataSource, Mutation, RowFilter};

/// One table: its structure plus rows in storage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub schema: TableSchema,
    pub rows: Vec<Row>,
}

impl TableData {
    /// Build a table, checking every row's width and cell types.
    pub fn new(schema: TableSchema, rows: Vec<Row>) -> StoreResult<Self> {
        let table = Self { schema, rows };
        table.check_rows(&table.rows)?;
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    fn check_rows(&self, rows: &[Row]) -> StoreResult<()> {
        let width = self.schema.columns.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(StoreError::RowWidth {
                    row: i,
                    found: row.len(),
                    expected: width,
                });
            }
            for (cell, col) in row.iter().zip(&self.schema.columns) {
                if !cell.fits(col.column_type) {
                    return Err(self.mismatch(&col.name, cell));
                }
            }
        }
        Ok(())
    }

    fn index(&self, column: &str) -> StoreResult<usize> {
        self.schema
            .position(column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.schema.name.clone(),
                column: column.to_string(),
            })
    }

    fn indices(&self, columns: &[String]) -> StoreResult<Vec<usize>> {
        if columns.is_empty() {
            return Ok((0..self.schema.columns.len()).collect());
        }
        columns.iter().map(|c| self.index(c)).collect()
    }

    fn mismatch(&self, column: &str, value: &Value) -> StoreError {
        let expected = self
            .schema
            .column(column)
            .map(|c| c.column_type.to_string())
            .unwrap_or_default();
        StoreError::TypeMismatch {
            table: self.schema.name.clone(),
            column: column.to_string(),
            expected,
            value: value.to_string(),
        }
    }

    /// Apply `mutation` in place, returning rows touched. Callers run this
    /// on a copy so a failure part-way leaves the stored table untouched.
    fn apply(&mut self, mutation: &Mutation) -> StoreResult<usize> {
        match mutation {
            Mutation::DeleteMissing { columns } => {
                let idx = self.indices(columns)?;
                let before = self.rows.len();
                self.rows.retain(|row| idx.iter().all(|&i| !row[i].is_null()));
                Ok(before - self.rows.len())
            }
            Mutation::DeleteDuplicates { subset } => {
                let idx = self.indices(subset)?;
                let before = self.rows.len();
                let mut seen = HashSet::new();
                self.rows.retain(|row| {
                    let key: Vec<String> = idx.iter().map(|&i| row[i].group_key()).collect();
                    seen.insert(key)
                });
                Ok(before - self.rows.len())
            }
            Mutation::UpdateWhere {
                column,
                predicate,
                value,
            } => {
                let i = self.index(column)?;
                if !value.fits(self.schema.columns[i].column_type) {
                    return Err(self.mismatch(column, value));
                }
                let mut hits = Vec::new();
                for (n, row) in self.rows.iter().enumerate() {
                    if eval::matches(predicate, &self.schema, row)? {
                        hits.push(n);
                    }
                }
                for &n in &hits {
                    self.rows[n][i] = value.clone();
                }
                Ok(hits.len())
            }
            Mutation::RewriteColumn { column, values } => {
                let i = self.index(column)?;
                if values.len() != self.rows.len() {
                    return Err(StoreError::Conflict(format!(
                        "rewrite of {}.{column} carries {} values for {} rows",
                        self.schema.name,
                        values.len(),
                        self.rows.len()
                    )));
                }
                let ty = self.schema.columns[i].column_type;
                if let Some(bad) = values.iter().find(|v| !v.fits(ty)) {
                    return Err(self.mismatch(column, bad));
                }
                let mut changed = 0;
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if row[i] != *value {
                        row[i] = value.clone();
                        changed += 1;
                    }
                }
                Ok(changed)
            }
            Mutation::RenameColumn { from, to } => {
                self.schema = self.schema.with_renamed_column(from, to)?;
                Ok(self.rows.len())
            }
            Mutation::AddColumn { column } => {
                self.schema = self.schema.with_added_column(column.clone())?;
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
                Ok(self.rows.len())
            }
            Mutation::InsertRows { rows } => {
                self.check_rows(rows)?;
                self.rows.extend(rows.iter().cloned());
                Ok(rows.len())
            }
        }
    }
}

/// Serialized form of a whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tables: Vec<TableData>,
}

/// Tables held in process memory. Table names are matched
/// case-insensitively.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, TableData>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store from already-validated tables.
    pub fn with_tables(tables: Vec<TableData>) -> Self {
        let map = tables
            .into_iter()
            .map(|t| (t.name().to_lowercase(), t))
            .collect();
        Self {
            tables: RwLock::new(map),
        }
    }

    /// Create a store from a snapshot, re-validating every row.
    pub fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        let mut tables = Vec::with_capacity(snapshot.tables.len());
        for t in snapshot.tables {
            tables.push(TableData::new(t.schema, t.rows)?);
        }
        Ok(Self::with_tables(tables))
    }

    /// Load a JSON snapshot file (`{"tables": [{"schema": …, "rows": […]}]}`).
    pub async fn load_json(path: &str) -> StoreResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Io(format!("{path}: {e}")))?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| StoreError::Parse(format!("{path}: {e}")))?;
        let store = Self::from_snapshot(snapshot)?;
        tracing::info!(path, tables = store.tables.read().await.len(), "snapshot loaded");
        Ok(store)
    }

    /// Current contents, tables sorted by name.
    pub async fn snapshot(&self) -> Snapshot {
        let guard = self.tables.read().await;
        let mut tables: Vec<TableData> = guard.values().cloned().collect();
        tables.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));
        Snapshot { tables }
    }

    /// Add or replace a table.
    pub async fn insert_table(&self, table: TableData) {
        self.tables
            .write()
            .await
            .insert(table.name().to_lowercase(), table);
    }

    pub async fn row_count(&self, table: &str) -> StoreResult<usize> {
        let guard = self.tables.read().await;
        guard
            .get(&table.to_lowercase())
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

#[async_trait]
impl DataSource for MemoryStore {
    async fn read_rows(&self, table: &str, filter: &RowFilter) -> StoreResult<Vec<Row>> {
        let guard = self.tables.read().await;
        let data = guard
            .get(&table.to_lowercase())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        match filter {
            RowFilter::All => Ok(data.rows.clone()),
            RowFilter::Where { predicate } => eval::filter_rows(predicate, &data.schema, &data.rows),
        }
    }

    async fn write_rows(&self, table: &str, mutation: &Mutation) -> StoreResult<usize> {
        let mut guard = self.tables.write().await;
        let slot = guard
            .get_mut(&table.to_lowercase())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let mut staged = slot.clone();
        let touched = staged.apply(mutation)?;
        *slot = staged;
        tracing::debug!(table, rows_affected = touched, "mutation applied");
        Ok(touched)
    }

    async fn get_schema(&self, table: &str) -> StoreResult<TableSchema> {
        let guard = self.tables.read().await;
        guard
            .get(&table.to_lowercase())
            .map(|t| t.schema.clone())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        let guard = self.tables.read().await;
        let mut names: Vec<String> = guard.values().map(|t| t.schema.name.clone()).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cq_protocol::{ColumnDef, ColumnType, Comparison, Literal, Predicate, SemanticRole};

    fn vitals() -> MemoryStore {
        let schema = TableSchema::new(
            "vitals",
            vec![
                ColumnDef::new("patient_id", ColumnType::Text, SemanticRole::Identifier),
                ColumnDef::new("heart_rate", ColumnType::Real, SemanticRole::Measurement),
                ColumnDef::new("arm", ColumnType::Text, SemanticRole::Category),
            ],
        )
        .unwrap();
        let rows = vec![
            vec![Value::Text("P1".into()), Value::Real(72.0), Value::Text("A".into())],
            vec![Value::Text("P2".into()), Value::Null, Value::Text("B".into())],
            vec![Value::Text("P3".into()), Value::Real(88.5), Value::Text("A".into())],
            vec![Value::Text("P1".into()), Value::Real(72.0), Value::Text("A".into())],
        ];
        MemoryStore::with_tables(vec![TableData::new(schema, rows).unwrap()])
    }

    #[tokio::test]
    async fn read_with_filter() {
        let store = vitals();
        let rows = store
            .read_rows(
                "vitals",
                &RowFilter::Where {
                    predicate: Predicate::Compare {
                        column: "heart_rate".into(),
                        cmp: Comparison::Gt,
                        value: Literal::Integer(80),
                    },
                },
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Text("P3".into()));
    }

    #[tokio::test]
    async fn table_names_are_case_insensitive() {
        let store = vitals();
        assert_eq!(store.row_count("VITALS").await.unwrap(), 4);
        assert!(matches!(
            store.read_rows("labs", &RowFilter::All).await,
            Err(StoreError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn delete_missing_counts_removed_rows() {
        let store = vitals();
        let n = store
            .write_rows(
                "vitals",
                &Mutation::DeleteMissing {
                    columns: vec!["heart_rate".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.row_count("vitals").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_duplicates_keeps_first() {
        let store = vitals();
        let n = store
            .write_rows("vitals", &Mutation::DeleteDuplicates { subset: vec![] })
            .await
            .unwrap();
        assert_eq!(n, 1);
        let again = store
            .write_rows("vitals", &Mutation::DeleteDuplicates { subset: vec![] })
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_table_unchanged() {
        let store = vitals();
        let before = store.snapshot().await;
        let err = store
            .write_rows(
                "vitals",
                &Mutation::RewriteColumn {
                    column: "heart_rate".into(),
                    values: vec![
                        Value::Real(1.0),
                        Value::Real(2.0),
                        Value::Text("fast".into()),
                        Value::Real(4.0),
                    ],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
        assert_eq!(store.snapshot().await.tables, before.tables);
    }

    #[tokio::test]
    async fn rewrite_requires_one_value_per_row() {
        let store = vitals();
        let err = store
            .write_rows(
                "vitals",
                &Mutation::RewriteColumn {
                    column: "heart_rate".into(),
                    values: vec![Value::Real(1.0)],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_where_replaces_matching_cells() {
        let store = vitals();
        let n = store
            .write_rows(
                "vitals",
                &Mutation::UpdateWhere {
                    column: "arm".into(),
                    predicate: Predicate::Compare {
                        column: "arm".into(),
                        cmp: Comparison::Eq,
                        value: Literal::Text("A".into()),
                    },
                    value: Value::Text("Active".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn rename_updates_schema() {
        let store = vitals();
        store
            .write_rows(
                "vitals",
                &Mutation::RenameColumn {
                    from: "arm".into(),
                    to: "treatment_arm".into(),
                },
            )
            .await
            .unwrap();
        let schema = store.get_schema("vitals").await.unwrap();
        assert!(schema.has_column("treatment_arm"));
        assert!(!schema.has_column("arm"));
    }

    #[tokio::test]
    async fn add_column_fills_nulls() {
        let store = vitals();
        let n = store
            .write_rows(
                "vitals",
                &Mutation::AddColumn {
                    column: ColumnDef::new("weight", ColumnType::Real, SemanticRole::Measurement),
                },
            )
            .await
            .unwrap();
        assert_eq!(n, 4);
        let rows = store.read_rows("vitals", &RowFilter::All).await.unwrap();
        assert!(rows.iter().all(|r| r.len() == 4 && r[3].is_null()));
    }

    #[tokio::test]
    async fn snapshot_json_roundtrip() {
        let store = vitals();
        let json = serde_json::to_string(&store.snapshot().await).unwrap();
        let restored = MemoryStore::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.row_count("vitals").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn load_json_missing_file() {
        let err = MemoryStore::load_json("/nonexistent/snapshot.json")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
