//! Dataset-wide clinical checks.
//!
//! Tables are recognized by the columns they carry rather than by name, so
//! a registered table with `scheduled_date` and `visit_date` is checked for
//! late visits whatever it is called. Every finding is a `QualityIssue`
//! with a severity tier; `check_dataset` runs all checks and tallies them.

use std::collections::HashMap;

use chrono::NaiveDate;
use cq_protocol::{parse_any_date, Row, SemanticRole, TableSchema, Value};
use serde::{Deserialize, Serialize};

use crate::memory::TableData;
use crate::quality::{LAB_HIGH, LAB_LOW, LAB_VALUE};

const PATIENT: &str = "patient_id";
const ENROLLED: &str = "enrollment_date";
const EVENT_TERM: &str = "event_term";
const EVENT_DATE: &str = "event_date";
const SEVERITY: &str = "severity";
const RESOLVED: &str = "resolved";
const SCHEDULED: &str = "scheduled_date";
const VISITED: &str = "visit_date";
const VISIT_TYPE: &str = "visit_type";
const TEST_NAME: &str = "test_name";
const UNIT: &str = "unit";

/// A visit later than this many days after schedule is a deviation.
const VISIT_WINDOW_DAYS: i64 = 7;
const VISIT_HIGH_DAYS: i64 = 14;
const VISIT_CRITICAL_DAYS: i64 = 21;

const OPEN_MEDIUM_DAYS: i64 = 30;
const OPEN_HIGH_DAYS: i64 = 90;

/// Relative distance past the violated bound.
const OUTLIER_HIGH: f64 = 0.2;
const OUTLIER_CRITICAL: f64 = 0.5;

/// Check labels in report order.
pub const CHECKS: [&str; 6] = [
    "missing_value",
    "lab_outlier",
    "protocol_deviation",
    "duplicate_record",
    "date_anomaly",
    "unresolved_event",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierDirection {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum IssueKind {
    /// A field every adverse event must carry is null.
    MissingValue {
        column: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_term: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_date: Option<String>,
    },
    LabOutlier {
        #[serde(skip_serializing_if = "Option::is_none")]
        test_name: Option<String>,
        value: f64,
        low: f64,
        high: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        direction: OutlierDirection,
    },
    ProtocolDeviation {
        #[serde(skip_serializing_if = "Option::is_none")]
        visit_type: Option<String>,
        scheduled: NaiveDate,
        actual: NaiveDate,
        days_late: i64,
    },
    /// The table's record key appears more than once.
    DuplicateRecord { key: String, copies: usize },
    /// An event dated before its patient enrolled.
    DateAnomaly {
        event_date: NaiveDate,
        enrollment_date: NaiveDate,
    },
    UnresolvedEvent {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_severity: Option<String>,
        /// `None` when the event date is missing or unreadable.
        days_open: Option<i64>,
    },
}

impl IssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingValue { .. } => CHECKS[0],
            Self::LabOutlier { .. } => CHECKS[1],
            Self::ProtocolDeviation { .. } => CHECKS[2],
            Self::DuplicateRecord { .. } => CHECKS[3],
            Self::DateAnomaly { .. } => CHECKS[4],
            Self::UnresolvedEvent { .. } => CHECKS[5],
        }
    }
}

/// One finding, pinned to a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub table: String,
    /// Position of the offending row (the first copy for duplicates).
    pub row: usize,
    /// Value of the table's record key, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    pub severity: IssueSeverity,
    #[serde(flatten)]
    pub kind: IssueKind,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTally {
    pub check: String,
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// All findings across a dataset, as of one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub as_of: NaiveDate,
    pub issues: Vec<QualityIssue>,
    pub summary: Vec<CheckTally>,
}

impl DatasetReport {
    pub fn of_check(&self, check: &str) -> impl Iterator<Item = &QualityIssue> + '_ {
        let check = check.to_string();
        self.issues.iter().filter(move |i| i.kind.label() == check)
    }
}

/// Run every check over `tables`. `as_of` dates open events.
pub fn check_dataset(tables: &[TableData], as_of: NaiveDate) -> DatasetReport {
    let mut issues = Vec::new();
    for table in tables {
        let t = Table::new(table);
        issues.extend(missing_event_fields(&t));
        issues.extend(lab_outliers(&t));
        issues.extend(protocol_deviations(&t));
        issues.extend(duplicate_records(&t));
    }
    issues.extend(date_anomalies(tables));
    for table in tables {
        issues.extend(unresolved_events(&Table::new(table), as_of));
    }
    issues.sort_by_key(|i| CHECKS.iter().position(|c| *c == i.kind.label()));
    tracing::debug!(tables = tables.len(), issues = issues.len(), "dataset checked");
    DatasetReport {
        as_of,
        summary: tally(&issues),
        issues,
    }
}

fn tally(issues: &[QualityIssue]) -> Vec<CheckTally> {
    CHECKS
        .iter()
        .map(|check| {
            let mut t = CheckTally {
                check: check.to_string(),
                ..CheckTally::default()
            };
            for issue in issues.iter().filter(|i| i.kind.label() == *check) {
                t.total += 1;
                match issue.severity {
                    IssueSeverity::Critical => t.critical += 1,
                    IssueSeverity::High => t.high += 1,
                    IssueSeverity::Medium => t.medium += 1,
                    IssueSeverity::Low => t.low += 1,
                }
            }
            t
        })
        .collect()
}

// ── Table access ────────────────────────────────────────────────

/// A table with its key and patient columns resolved once.
struct Table<'a> {
    schema: &'a TableSchema,
    rows: &'a [Row],
    key: Option<usize>,
    patient: Option<usize>,
}

impl<'a> Table<'a> {
    fn new(data: &'a TableData) -> Self {
        let schema = &data.schema;
        Self {
            schema,
            rows: &data.rows,
            key: schema
                .columns
                .iter()
                .position(|c| c.role == SemanticRole::Identifier),
            patient: schema.position(PATIENT),
        }
    }

    fn col(&self, name: &str) -> Option<usize> {
        self.schema.position(name)
    }

    fn issue(&self, row: usize, severity: IssueSeverity, kind: IssueKind, description: String) -> QualityIssue {
        let r = &self.rows[row];
        QualityIssue {
            table: self.schema.name.clone(),
            row,
            record_id: text(r, self.key),
            patient_id: text(r, self.patient),
            severity,
            kind,
            description,
        }
    }
}

fn text(row: &Row, at: Option<usize>) -> Option<String> {
    at.map(|i| &row[i])
        .filter(|v| !v.is_null())
        .map(Value::to_string)
}

fn date(row: &Row, at: usize) -> Option<NaiveDate> {
    row[at].as_str().and_then(parse_any_date)
}

fn or_unknown(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("unknown")
}

// ── Checks ──────────────────────────────────────────────────────

/// Null severity (high) or resolution (medium) on an adverse event.
fn missing_event_fields(t: &Table<'_>) -> Vec<QualityIssue> {
    let Some(term) = t.col(EVENT_TERM) else {
        return Vec::new();
    };
    let fields = [(SEVERITY, IssueSeverity::High), (RESOLVED, IssueSeverity::Medium)];
    let mut out = Vec::new();
    for (column, severity) in fields {
        let Some(c) = t.col(column) else { continue };
        for (i, r) in t.rows.iter().enumerate() {
            if !r[c].is_null() {
                continue;
            }
            let event_term = text(r, Some(term));
            let patient = text(r, t.patient);
            let description = format!(
                "adverse event '{}' for patient {} is missing {column}",
                or_unknown(&event_term),
                or_unknown(&patient)
            );
            let kind = IssueKind::MissingValue {
                column: t.schema.columns[c].name.clone(),
                event_term,
                event_date: text(r, t.col(EVENT_DATE)),
            };
            out.push(t.issue(i, severity, kind, description));
        }
    }
    out
}

fn lab_outliers(t: &Table<'_>) -> Vec<QualityIssue> {
    let (Some(v), Some(lo), Some(hi)) = (t.col(LAB_VALUE), t.col(LAB_LOW), t.col(LAB_HIGH)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (i, r) in t.rows.iter().enumerate() {
        let (Some(value), Some(low), Some(high)) = (r[v].as_f64(), r[lo].as_f64(), r[hi].as_f64())
        else {
            continue;
        };
        let (direction, past, bound) = if value > high {
            (OutlierDirection::High, value - high, high)
        } else if value < low {
            (OutlierDirection::Low, low - value, low)
        } else {
            continue;
        };
        let deviation = if bound > 0.0 { past / bound } else { f64::INFINITY };
        let severity = if deviation > OUTLIER_CRITICAL {
            IssueSeverity::Critical
        } else if deviation > OUTLIER_HIGH {
            IssueSeverity::High
        } else {
            IssueSeverity::Medium
        };
        let test_name = text(r, t.col(TEST_NAME));
        let unit = text(r, t.col(UNIT));
        let description = format!(
            "{}: {value} {} ({direction:?}, range {low}-{high})",
            or_unknown(&test_name),
            unit.as_deref().unwrap_or_default()
        );
        let kind = IssueKind::LabOutlier {
            test_name,
            value,
            low,
            high,
            unit,
            direction,
        };
        out.push(t.issue(i, severity, kind, description));
    }
    out
}

fn protocol_deviations(t: &Table<'_>) -> Vec<QualityIssue> {
    let (Some(s), Some(a)) = (t.col(SCHEDULED), t.col(VISITED)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (i, r) in t.rows.iter().enumerate() {
        let (Some(scheduled), Some(actual)) = (date(r, s), date(r, a)) else {
            continue;
        };
        let days_late = (actual - scheduled).num_days();
        if days_late <= VISIT_WINDOW_DAYS {
            continue;
        }
        let severity = if days_late > VISIT_CRITICAL_DAYS {
            IssueSeverity::Critical
        } else if days_late > VISIT_HIGH_DAYS {
            IssueSeverity::High
        } else {
            IssueSeverity::Medium
        };
        let visit_type = text(r, t.col(VISIT_TYPE));
        let description = format!(
            "{} for patient {} was {days_late} days late",
            visit_type.as_deref().unwrap_or("visit"),
            or_unknown(&text(r, t.patient))
        );
        let kind = IssueKind::ProtocolDeviation {
            visit_type,
            scheduled,
            actual,
            days_late,
        };
        out.push(t.issue(i, severity, kind, description));
    }
    out
}

/// Repeated record keys. One issue per key, pinned to its first row.
fn duplicate_records(t: &Table<'_>) -> Vec<QualityIssue> {
    let Some(k) = t.key else {
        return Vec::new();
    };
    let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = Vec::new();
    for (i, r) in t.rows.iter().enumerate() {
        if r[k].is_null() {
            continue;
        }
        let entry = seen.entry(r[k].group_key()).or_insert_with(|| {
            order.push(r[k].group_key());
            (i, 0)
        });
        entry.1 += 1;
    }
    let key_name = &t.schema.columns[k].name;
    order
        .iter()
        .filter_map(|g| seen.get(g))
        .filter(|(_, copies)| *copies > 1)
        .map(|&(first, copies)| {
            let key = t.rows[first][k].to_string();
            let description = format!("{key_name} {key} appears {copies} times in {}", t.schema.name);
            t.issue(
                first,
                IssueSeverity::Critical,
                IssueKind::DuplicateRecord { key, copies },
                description,
            )
        })
        .collect()
}

/// Events dated before the patient's enrollment, across tables.
fn date_anomalies(tables: &[TableData]) -> Vec<QualityIssue> {
    let mut enrolled: HashMap<String, NaiveDate> = HashMap::new();
    for data in tables {
        let t = Table::new(data);
        let (Some(p), Some(e)) = (t.patient, t.col(ENROLLED)) else {
            continue;
        };
        for r in t.rows {
            if let (Some(id), Some(d)) = (text(r, Some(p)), date(r, e)) {
                enrolled.entry(id).or_insert(d);
            }
        }
    }

    let mut out = Vec::new();
    for data in tables {
        let t = Table::new(data);
        let (Some(p), Some(e)) = (t.patient, t.col(EVENT_DATE)) else {
            continue;
        };
        for (i, r) in t.rows.iter().enumerate() {
            let Some(patient) = text(r, Some(p)) else { continue };
            let (Some(event_date), Some(&enrollment_date)) = (date(r, e), enrolled.get(&patient))
            else {
                continue;
            };
            if event_date >= enrollment_date {
                continue;
            }
            let description = format!(
                "event '{}' for patient {patient} is dated {event_date}, before enrollment on {enrollment_date}",
                or_unknown(&text(r, t.col(EVENT_TERM)))
            );
            let kind = IssueKind::DateAnomaly {
                event_date,
                enrollment_date,
            };
            out.push(t.issue(i, IssueSeverity::High, kind, description));
        }
    }
    out
}

/// Events not marked resolved, tiered by how long they have been open.
fn unresolved_events(t: &Table<'_>, as_of: NaiveDate) -> Vec<QualityIssue> {
    let (Some(res), Some(e)) = (t.col(RESOLVED), t.col(EVENT_DATE)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (i, r) in t.rows.iter().enumerate() {
        if !is_unresolved(&r[res]) {
            continue;
        }
        let days_open = date(r, e).map(|d| (as_of - d).num_days());
        let severity = match days_open {
            Some(d) if d > OPEN_HIGH_DAYS => IssueSeverity::High,
            Some(d) if d > OPEN_MEDIUM_DAYS => IssueSeverity::Medium,
            _ => IssueSeverity::Low,
        };
        let open_for = days_open.map_or_else(|| "an unknown time".to_string(), |d| format!("{d} days"));
        let description = format!(
            "event '{}' for patient {} unresolved for {open_for}",
            or_unknown(&text(r, t.col(EVENT_TERM))),
            or_unknown(&text(r, t.patient))
        );
        let kind = IssueKind::UnresolvedEvent {
            event_severity: text(r, t.col(SEVERITY)),
            days_open,
        };
        out.push(t.issue(i, severity, kind, description));
    }
    out
}

fn is_unresolved(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Int(n) => *n == 0,
        Value::Text(s) => matches!(s.trim().to_lowercase().as_str(), "no" | "n" | "false" | "open"),
        Value::Real(_) => false,
    }
}
