use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Date,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a column means, independent of how it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Identifier,
    Measurement,
    Category,
    Timestamp,
    Free,
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub role: SemanticRole,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType, role: SemanticRole) -> Self {
        Self {
            name: name.into(),
            column_type,
            role,
        }
    }
}

/// Errors raised while building or evolving a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("table '{0}' declares no columns")]
    NoColumns(String),

    #[error("column name must not be empty in table '{0}'")]
    EmptyColumnName(String),

    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{0}' is already registered")]
    DuplicateTable(String),

    #[error("table '{0}' is not registered")]
    UnknownTable(String),

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },
}

/// Ordered column list of a single table. Column names are unique
/// (case-insensitively) within the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTableSchema")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Deserialize)]
struct RawTableSchema {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TryFrom<RawTableSchema> for TableSchema {
    type Error = SchemaError;

    fn try_from(raw: RawTableSchema) -> Result<Self, Self::Error> {
        TableSchema::new(raw.name, raw.columns)
    }
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if columns.is_empty() {
            return Err(SchemaError::NoColumns(name));
        }
        for (i, col) in columns.iter().enumerate() {
            if col.name.trim().is_empty() {
                return Err(SchemaError::EmptyColumnName(name));
            }
            if columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&col.name))
            {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: col.name.clone(),
                });
            }
        }
        Ok(Self { name, columns })
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Copy of this schema with one column renamed.
    pub fn with_renamed_column(&self, from: &str, to: &str) -> Result<Self, SchemaError> {
        let idx = self.position(from).ok_or_else(|| SchemaError::UnknownColumn {
            table: self.name.clone(),
            column: from.to_string(),
        })?;
        let mut columns = self.columns.clone();
        columns[idx].name = to.to_string();
        Self::new(self.name.clone(), columns)
    }

    /// Copy of this schema with a column appended.
    pub fn with_added_column(&self, column: ColumnDef) -> Result<Self, SchemaError> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self::new(self.name.clone(), columns)
    }
}

/// An explicit schema-evolution operation. Registered tables change only
/// through one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum SchemaChange {
    RenameColumn { from: String, to: String },
    AddColumn { column: ColumnDef },
}

impl SchemaChange {
    pub fn apply(&self, table: &TableSchema) -> Result<TableSchema, SchemaError> {
        match self {
            Self::RenameColumn { from, to } => table.with_renamed_column(from, to),
            Self::AddColumn { column } => table.with_added_column(column.clone()),
        }
    }
}

/// Ordered mapping of table name to table schema, with a version that
/// increments on every registration or evolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub version: u64,
    tables: Vec<TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn register(&mut self, table: TableSchema) -> Result<(), SchemaError> {
        if self.table(&table.name).is_some() {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        self.tables.push(table);
        self.version += 1;
        Ok(())
    }

    /// Apply a schema change to a registered table and return the new table.
    pub fn evolve(&mut self, table: &str, change: &SchemaChange) -> Result<TableSchema, SchemaError> {
        let idx = self
            .tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(table))
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        let evolved = change.apply(&self.tables[idx])?;
        self.tables[idx] = evolved.clone();
        self.version += 1;
        Ok(evolved)
    }
}
