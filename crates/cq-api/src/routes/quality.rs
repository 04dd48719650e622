//! Data-quality endpoints: per-table profile, dataset-wide checks and the
//! clarification requests drafted from them.

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{NaiveDate, Utc};
use cq_store::{
    ClarificationRequest, DatasetReport, QualityReport, RowFilter, TableData, checks,
    clarification, quality,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AsOf {
    /// Day open events are aged against; today when absent.
    pub as_of: Option<NaiveDate>,
}

impl AsOf {
    fn day(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// GET /api/v1/quality/{table}: missing values, duplicate rows and out-of-range labs.
pub async fn table_quality(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> ApiResult<Json<QualityReport>> {
    if state.engine.schema().await.table(&table).is_none() {
        return Err(ApiError::NotFound(format!("table '{table}' is not registered")));
    }
    Ok(Json(quality::profile(&load(&state, &table).await?)))
}

/// GET /api/v1/quality?as_of=: every check across the registered tables.
pub async fn dataset_quality(
    State(state): State<AppState>,
    Query(q): Query<AsOf>,
) -> ApiResult<Json<DatasetReport>> {
    let tables = load_all(&state).await?;
    Ok(Json(checks::check_dataset(&tables, q.day())))
}

/// GET /api/v1/quality/clarifications?as_of=: requests for site follow-up.
pub async fn clarifications(
    State(state): State<AppState>,
    Query(q): Query<AsOf>,
) -> ApiResult<Json<Vec<ClarificationRequest>>> {
    let tables = load_all(&state).await?;
    let report = checks::check_dataset(&tables, q.day());
    let requests = clarification::draft_requests(&report, &tables);
    tracing::info!(issues = report.issues.len(), requests = requests.len(), "clarifications drafted");
    Ok(Json(requests))
}

async fn load(state: &AppState, table: &str) -> ApiResult<TableData> {
    let source = state.engine.source();
    Ok(TableData {
        schema: source.get_schema(table).await?,
        rows: source.read_rows(table, &RowFilter::All).await?,
    })
}

async fn load_all(state: &AppState) -> ApiResult<Vec<TableData>> {
    let mut tables = Vec::new();
    for name in state.engine.schema().await.table_names() {
        tables.push(load(state, &name).await?);
    }
    Ok(tables)
}
