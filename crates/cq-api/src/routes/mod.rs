//! API route definitions and router builder.

pub mod audit;
pub mod health;
pub mod instructions;
pub mod quality;
pub mod schemas;

use axum::Router;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Instruction pipeline
        .route("/instructions", post(instructions::submit_instruction))
        .route("/confirmations", post(instructions::confirm_plan))
        // Audit log
        .route("/audit", get(audit::audit_range))
        // Schema boundary
        .route(
            "/schemas",
            get(schemas::list_schemas).post(schemas::register_table),
        )
        .route("/schemas/{table}/changes", post(schemas::evolve_table))
        // Data quality
        .route("/quality", get(quality::dataset_quality))
        .route("/quality/clarifications", get(quality::clarifications))
        .route("/quality/{table}", get(quality::table_quality));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
