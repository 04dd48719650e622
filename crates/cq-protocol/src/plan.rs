//! Operation plans: the backend-independent, schema-checked form of an
//! instruction.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dates::DateFormat;
use crate::intent::Intent;
use crate::params::{AggregateFn, Literal, Operator};

/// Binary comparison inside a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    pub fn from_operator(op: Operator) -> Option<Self> {
        match op {
            Operator::Gt => Some(Self::Gt),
            Operator::Lt => Some(Self::Lt),
            Operator::Ge => Some(Self::Ge),
            Operator::Le => Some(Self::Le),
            Operator::Eq => Some(Self::Eq),
            Operator::Ne => Some(Self::Ne),
            Operator::Between => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }
}

/// Row predicate. Evaluation treats a null cell as not matching any
/// comparison, so `Not` of a comparison matches nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        cmp: Comparison,
        value: Literal,
    },
    /// Inclusive on both ends.
    Between {
        column: String,
        low: Literal,
        high: Literal,
    },
    IsNull {
        column: String,
    },
    Not {
        inner: Box<Predicate>,
    },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Self::Compare { column, .. } | Self::Between { column, .. } | Self::IsNull { column } => {
                column
            }
            Self::Not { inner } => inner.column(),
        }
    }

    /// Logical complement.
    pub fn negate(self) -> Self {
        match self {
            Self::Not { inner } => *inner,
            other => Self::Not {
                inner: Box::new(other),
            },
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compare { column, cmp, value } => write!(f, "{column} {} {value}", cmp.symbol()),
            Self::Between { column, low, high } => write!(f, "{column} between {low} and {high}"),
            Self::IsNull { column } => write!(f, "{column} is null"),
            Self::Not { inner } => write!(f, "not ({inner})"),
        }
    }
}

/// The concrete operation, one variant per supported intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Remove rows with a null in any of `columns`.
    DropMissing { columns: Vec<String> },
    ReplaceValue {
        column: String,
        from: Literal,
        to: Literal,
    },
    /// Rows matching `predicate`, projected to `columns` (all when empty).
    Filter {
        predicate: Predicate,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
    },
    Standardize { column: String, format: DateFormat },
    RenameColumn { from: String, to: String },
    /// Keep the first row of each duplicate group, comparing `subset`
    /// columns (all columns when empty).
    DropDuplicates { subset: Vec<String> },
    Aggregate {
        column: String,
        function: AggregateFn,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_by: Option<String>,
    },
    /// Min-max scale into [0, 1].
    Normalize { column: String },
    Select { columns: Vec<String> },
    Count {
        #[serde(skip_serializing_if = "Option::is_none")]
        predicate: Option<Predicate>,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_by: Option<String>,
    },
}

/// Structural identity of a plan: SHA-256 over its canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A compiled, schema-checked operation against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationPlan {
    pub intent: Intent,
    pub table: String,
    pub operation: Operation,
    pub destructive: bool,
}

impl OperationPlan {
    pub fn new(intent: Intent, table: impl Into<String>, operation: Operation) -> Self {
        Self {
            intent,
            table: table.into(),
            operation,
            destructive: intent.is_destructive(),
        }
    }

    pub fn id(&self) -> PlanId {
        // Struct fields serialize in declaration order and every nested map is
        // a struct, so the JSON encoding is canonical.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut h = Sha256::new();
        h.update(&bytes);
        PlanId(format!("{:x}", h.finalize()))
    }

    /// Every column name the plan reads or writes.
    pub fn referenced_columns(&self) -> Vec<&str> {
        match &self.operation {
            Operation::DropMissing { columns } | Operation::Select { columns } => {
                columns.iter().map(String::as_str).collect()
            }
            Operation::DropDuplicates { subset } => subset.iter().map(String::as_str).collect(),
            Operation::ReplaceValue { column, .. }
            | Operation::Standardize { column, .. }
            | Operation::Normalize { column } => vec![column.as_str()],
            Operation::Filter { predicate, columns } => {
                let mut cols = vec![predicate.column()];
                cols.extend(columns.iter().map(String::as_str));
                cols
            }
            Operation::RenameColumn { from, .. } => vec![from.as_str()],
            Operation::Aggregate {
                column, group_by, ..
            } => {
                let mut cols = vec![column.as_str()];
                cols.extend(group_by.as_deref());
                cols
            }
            Operation::Count {
                predicate,
                group_by,
            } => {
                let mut cols: Vec<&str> = predicate.iter().map(|p| p.column()).collect();
                cols.extend(group_by.as_deref());
                cols
            }
        }
    }

    /// Columns whose cell values or names the plan rewrites.
    pub fn mutated_columns(&self) -> Vec<&str> {
        match &self.operation {
            Operation::ReplaceValue { column, .. }
            | Operation::Standardize { column, .. }
            | Operation::Normalize { column } => vec![column.as_str()],
            Operation::RenameColumn { from, .. } => vec![from.as_str()],
            _ => Vec::new(),
        }
    }

    /// One-line human description, used in confirmation prompts and audit.
    pub fn describe(&self) -> String {
        let t = &self.table;
        match &self.operation {
            Operation::DropMissing { columns } => {
                format!("delete rows of {t} where any of [{}] is null", columns.join(", "))
            }
            Operation::ReplaceValue { column, from, to } => {
                format!("replace {from} with {to} in {t}.{column}")
            }
            Operation::Filter { predicate, columns } if columns.is_empty() => {
                format!("rows of {t} where {predicate}")
            }
            Operation::Filter { predicate, columns } => {
                format!("[{}] of {t} where {predicate}", columns.join(", "))
            }
            Operation::Standardize { column, format } => {
                format!("rewrite dates in {t}.{column} as {format}")
            }
            Operation::RenameColumn { from, to } => format!("rename {t}.{from} to {to}"),
            Operation::DropDuplicates { subset } if subset.is_empty() => {
                format!("delete duplicate rows of {t}")
            }
            Operation::DropDuplicates { subset } => {
                format!("delete duplicate rows of {t} by [{}]", subset.join(", "))
            }
            Operation::Aggregate {
                column,
                function,
                group_by: Some(g),
            } => format!("{function}({column}) of {t} grouped by {g}"),
            Operation::Aggregate { column, function, .. } => format!("{function}({column}) of {t}"),
            Operation::Normalize { column } => format!("min-max normalize {t}.{column}"),
            Operation::Select { columns } => format!("select [{}] from {t}", columns.join(", ")),
            Operation::Count {
                predicate,
                group_by,
            } => {
                let mut s = format!("count rows of {t}");
                if let Some(p) = predicate {
                    s.push_str(&format!(" where {p}"));
                }
                if let Some(g) = group_by {
                    s.push_str(&format!(" grouped by {g}"));
                }
                s
            }
        }
    }
}
