//! Cell values, result sets and change summaries.

use serde::{Deserialize, Serialize};

use crate::dates::parse_any_date;
use crate::params::Literal;
use crate::schema::ColumnType;

/// A single cell. Dates are stored as text and interpreted through the
/// date allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

/// One row, aligned with the table's column order.
pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Real(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value may be stored in a column of the given type.
    /// Nulls fit everywhere.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        match (self, column_type) {
            (Self::Null, _) => true,
            (Self::Bool(_), ColumnType::Boolean) => true,
            (Self::Int(_), ColumnType::Integer | ColumnType::Real) => true,
            (Self::Real(_), ColumnType::Real) => true,
            (Self::Text(_), ColumnType::Text) => true,
            (Self::Text(s), ColumnType::Date) => parse_any_date(s).is_some(),
            _ => false,
        }
    }

    /// Key used for grouping and duplicate detection. Reals are keyed by
    /// their bit pattern so equal values group together.
    pub fn group_key(&self) -> String {
        match self {
            Self::Null => "\u{0}null".to_string(),
            Self::Bool(b) => format!("b:{b}"),
            Self::Int(n) => format!("n:{}", (*n as f64).to_bits()),
            Self::Real(n) => format!("n:{}", n.to_bits()),
            Self::Text(s) => format!("t:{s}"),
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Integer(n) => Self::Int(*n),
            Literal::Real(n) => Self::Real(*n),
            Literal::Date(d) => Self::Text(d.format("%Y-%m-%d").to_string()),
            Literal::Boolean(b) => Self::Bool(*b),
            Literal::Text(s) => Self::Text(s.clone()),
            Literal::Null => Self::Null,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Tabular output of a read-only plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Row count before the result limit was applied.
    pub total_rows: usize,
    pub truncated: bool,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let total_rows = rows.len();
        Self {
            columns,
            rows,
            total_rows,
            truncated: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Cap the number of rows kept, recording the original total.
    pub fn limited(mut self, limit: usize) -> Self {
        if self.rows.len() > limit {
            self.rows.truncate(limit);
            self.truncated = true;
        }
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// What a plan changed, with before/after counters for the data-quality
/// dimension the plan targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub rows_before: usize,
    pub rows_after: usize,
    pub rows_affected: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns_affected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_before: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_after: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates_before: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates_after: Option<usize>,
    pub description: String,
}
