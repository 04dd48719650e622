//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health: liveness check plus a glance at engine state.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let schema = state.engine.schema().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tables": schema.len(),
        "schema_version": schema.version,
        "pending_confirmations": state.engine.pending_count().await,
        "audit": if state.pool.is_some() { "postgres" } else { "memory" },
    }))
}
