//! Data-clarification requests drafted from quality findings.
//!
//! Missing event fields, lab outliers and late visits each get a request
//! addressed to the patient's site; the other checks need no site answer
//! and are skipped. Request ids are `DCR-<yyyymmdd>-<nnnn>`, numbered in
//! report order.

use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::checks::{DatasetReport, IssueKind, IssueSeverity, QualityIssue};
use crate::memory::TableData;

const SITE: &str = "site_id";
const PATIENT: &str = "patient_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
}

/// One request to a site study team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub query_id: String,
    pub check: String,
    pub table: String,
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub title: String,
    pub priority: IssueSeverity,
    pub status: RequestStatus,
    pub created: NaiveDate,
    pub due: NaiveDate,
    pub body: String,
}

/// Days a site has to answer, by priority.
pub fn response_days(priority: IssueSeverity) -> u64 {
    match priority {
        IssueSeverity::Critical => 1,
        IssueSeverity::High => 2,
        IssueSeverity::Medium => 5,
        IssueSeverity::Low => 10,
    }
}

/// Draft a request for every finding that needs one. `tables` supplies
/// patient sites.
pub fn draft_requests(report: &DatasetReport, tables: &[TableData]) -> Vec<ClarificationRequest> {
    let sites = patient_sites(tables);
    let created = report.as_of;
    report
        .issues
        .iter()
        .filter_map(|issue| template(issue).map(|t| (issue, t)))
        .enumerate()
        .map(|(n, (issue, (title, priority, detail, action)))| {
            let query_id = format!("DCR-{}-{:04}", created.format("%Y%m%d"), n + 1);
            let site_id = issue.patient_id.as_ref().and_then(|p| sites.get(p)).cloned();
            let due = created
                .checked_add_days(Days::new(response_days(priority)))
                .unwrap_or(created);
            let body = format!(
                "DATA CLARIFICATION REQUEST\n\n\
                 To: {} study team\n\
                 Date: {created}\n\
                 Query ID: {query_id}\n\
                 Priority: {}\n\n\
                 ISSUE:\n{detail}\n\n\
                 ACTION REQUIRED:\n{action}\n\n\
                 RESPONSE DUE: {due}\n",
                site_id.as_deref().map_or("Site".to_string(), |s| format!("Site {s}")),
                format!("{priority:?}").to_uppercase(),
            );
            ClarificationRequest {
                query_id,
                check: issue.kind.label().to_string(),
                table: issue.table.clone(),
                row: issue.row,
                patient_id: issue.patient_id.clone(),
                site_id,
                title,
                priority,
                status: RequestStatus::Open,
                created,
                due,
                body,
            }
        })
        .collect()
}

/// Title, priority, issue detail and requested action, or `None` when the
/// finding needs no site answer.
fn template(issue: &QualityIssue) -> Option<(String, IssueSeverity, String, String)> {
    let patient = issue.patient_id.as_deref().unwrap_or("unknown");
    match &issue.kind {
        IssueKind::MissingValue {
            column,
            event_term,
            event_date,
        } => {
            let action = if column == "severity" {
                "Please provide the severity classification (Mild/Moderate/Severe).".to_string()
            } else {
                format!("Please provide the {column} value for this event.")
            };
            Some((
                format!("Missing adverse event {column}"),
                issue.severity,
                format!(
                    "The following adverse event is missing {column}:\n  \
                     Patient ID: {patient}\n  \
                     Event ID: {}\n  \
                     Event Term: {}\n  \
                     Event Date: {}",
                    issue.record_id.as_deref().unwrap_or("unknown"),
                    event_term.as_deref().unwrap_or("unknown"),
                    event_date.as_deref().unwrap_or("unknown"),
                ),
                action,
            ))
        }
        IssueKind::LabOutlier {
            test_name,
            value,
            low,
            high,
            unit,
            direction,
        } => {
            let unit = unit.as_deref().unwrap_or_default();
            Some((
                "Lab value out of range".to_string(),
                IssueSeverity::High,
                format!(
                    "Out-of-range lab value identified:\n  \
                     Patient ID: {patient}\n  \
                     Test Name: {}\n  \
                     Test Value: {value} {unit}\n  \
                     Normal Range: {low} - {high} {unit}\n  \
                     Deviation: {direction:?}",
                    test_name.as_deref().unwrap_or("unknown"),
                ),
                "Please verify the value and provide a clinical assessment.".to_string(),
            ))
        }
        IssueKind::ProtocolDeviation {
            visit_type,
            scheduled,
            actual,
            days_late,
        } => Some((
            "Visit protocol deviation".to_string(),
            IssueSeverity::Medium,
            format!(
                "Protocol deviation identified:\n  \
                 Patient ID: {patient}\n  \
                 Visit: {}\n  \
                 Scheduled: {scheduled}\n  \
                 Actual: {actual}\n  \
                 Days Late: {days_late}",
                visit_type.as_deref().unwrap_or("unknown"),
            ),
            "Please provide the reason for the deviation.".to_string(),
        )),
        IssueKind::DuplicateRecord { .. }
        | IssueKind::DateAnomaly { .. }
        | IssueKind::UnresolvedEvent { .. } => None,
    }
}

/// Patient id to site id, from every table carrying both.
fn patient_sites(tables: &[TableData]) -> HashMap<String, String> {
    let mut sites = HashMap::new();
    for t in tables {
        let (Some(p), Some(s)) = (t.schema.position(PATIENT), t.schema.position(SITE)) else {
            continue;
        };
        for r in &t.rows {
            if let (Some(patient), Some(site)) = (r[p].as_str(), r[s].as_str()) {
                sites
                    .entry(patient.to_string())
                    .or_insert_with(|| site.to_string());
            }
        }
    }
    sites
}
