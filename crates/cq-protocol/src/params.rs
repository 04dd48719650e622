//! Structured parameters extracted from an instruction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Byte range into the source instruction a parameter was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Slice of `text` covered by this span, if it is in bounds.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// A parameter value plus where it came from.
///
/// `span` is `None` only for values filled from configuration (the default
/// table), never for values the extractor guessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extracted<T> {
    pub value: T,
    pub span: Option<Span>,
}

impl<T> Extracted<T> {
    pub fn at(value: T, span: Span) -> Self {
        Self {
            value,
            span: Some(span),
        }
    }

    pub fn configured(value: T) -> Self {
        Self { value, span: None }
    }
}

/// Parameter roles, used to report what an incomplete set is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    Table,
    Column,
    Operator,
    Value,
    Replacement,
    TargetFormat,
    AggregationFn,
    GroupBy,
    NewName,
}

impl ParamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Operator => "operator",
            Self::Value => "value",
            Self::Replacement => "replacement",
            Self::TargetFormat => "target_format",
            Self::AggregationFn => "aggregation_fn",
            Self::GroupBy => "group_by",
            Self::NewName => "new_name",
        }
    }
}

impl std::fmt::Display for ParamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators recognized by the lexical grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Between,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Between => "between",
        }
    }

    /// Operators that only make sense on ordered (numeric or date) columns.
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Ge | Self::Le | Self::Between)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The fixed set of aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Mean,
    Median,
    Sum,
    Count,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl std::fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A literal operand read from the instruction text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
    Boolean(bool),
    Text(String),
    Null,
}

impl Literal {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Date(_) => "date",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "text",
            Self::Null => "null",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Real(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Real(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Everything the extractor pulled out of one instruction.
///
/// A set with a non-empty `missing` list is incomplete; the compiler refuses
/// it rather than filling in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<Extracted<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Extracted<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Extracted<Operator>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Extracted<Literal>>,
    /// The predicate was negated ("not older than", "excluding ...").
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
    /// Columns to show for a filter; all when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projection: Vec<Extracted<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<Extracted<Literal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_format: Option<Extracted<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Extracted<AggregateFn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Extracted<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<Extracted<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<ParamRole>,
}

impl ParameterSet {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            table: None,
            columns: Vec::new(),
            operator: None,
            values: Vec::new(),
            negated: false,
            projection: Vec::new(),
            replacement: None,
            target_format: None,
            aggregation: None,
            group_by: None,
            new_name: None,
            missing: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn mark_missing(&mut self, role: ParamRole) {
        if !self.missing.contains(&role) {
            self.missing.push(role);
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_ref().map(|t| t.value.as_str())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.value.as_str()).collect()
    }
}
