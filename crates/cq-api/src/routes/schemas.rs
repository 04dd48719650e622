//! Schema-change boundary: registration and evolution, kept apart from the
//! instruction pipeline.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cq_protocol::{Row, Schema, SchemaChange, TableSchema};
use cq_store::TableData;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for registering a new table.
#[derive(Debug, Deserialize)]
pub struct RegisterTableRequest {
    pub schema: TableSchema,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// GET /api/v1/schemas: every registered table.
pub async fn list_schemas(State(state): State<AppState>) -> Json<Schema> {
    Json(state.engine.schema().await)
}

/// POST /api/v1/schemas: load a table into the dataset and register it.
pub async fn register_table(
    State(state): State<AppState>,
    Json(req): Json<RegisterTableRequest>,
) -> ApiResult<(StatusCode, Json<TableSchema>)> {
    let name = req.schema.name.clone();
    if state.engine.schema().await.table(&name).is_some() {
        return Err(ApiError::Conflict(format!("table '{name}' is already registered")));
    }
    let table = TableData::new(req.schema.clone(), req.rows)?;
    let rows = table.rows.len();
    state.store.insert_table(table).await;
    state.engine.register_schema(req.schema.clone()).await?;
    tracing::info!(table = %name, rows, "table registered over API");
    Ok((StatusCode::CREATED, Json(req.schema)))
}

/// POST /api/v1/schemas/{table}/changes: rename or add a column.
pub async fn evolve_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(change): Json<SchemaChange>,
) -> ApiResult<Json<TableSchema>> {
    Ok(Json(state.engine.evolve_schema(&table, &change).await?))
}
