//! Audit log query endpoint.

use axum::Json;
use axum::extract::{Query, State};
use cq_protocol::AuditRecord;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Inclusive sequence range; both ends optional.
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub from: Option<u64>,
    #[serde(default)]
    pub to: Option<u64>,
}

/// GET /api/v1/audit?from=&to=: records for instructions in the range.
pub async fn audit_range(
    State(state): State<AppState>,
    Query(q): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    let from = q.from.unwrap_or(1);
    let to = q.to.unwrap_or(u64::MAX);
    if from > to {
        return Err(ApiError::BadRequest(format!("empty range: from {from} > to {to}")));
    }
    Ok(Json(state.engine.audit_range(from, to).await?))
}
