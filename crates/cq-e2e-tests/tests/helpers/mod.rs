//! Shared test harness for E2E integration tests.
//!
//! Wires the Axum router over an engine backed by the clinical sample
//! store, so every request exercises screening, translation, validation,
//! the confirmation gate, execution and the audit log.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use cq_api::routes::build_router;
use cq_api::state::AppState;
use cq_engine::EngineConfig;
use cq_store::{DataSource, MemoryStore, RowFilter, sample};

/// Router plus direct handles on the state behind it.
pub struct TestHarness {
    pub state: AppState,
    pub router: Router,
}

impl TestHarness {
    /// Default engine config over the four-table clinical sample.
    pub async fn with_sample_data() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let store = sample::clinical_store().unwrap();
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: EngineConfig, store: MemoryStore) -> Self {
        let state = AppState::new(config, store).await.unwrap();
        let router = build_router(state.clone());
        Self { state, router }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    /// GET `uri` and decode the JSON body.
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// POST a JSON body to `uri`.
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    /// Submit an instruction (POST /api/v1/instructions).
    pub async fn submit(&self, text: &str) -> (StatusCode, Value) {
        self.post("/api/v1/instructions", json!({ "text": text })).await
    }

    /// Answer a confirmation prompt (POST /api/v1/confirmations).
    pub async fn confirm(&self, plan_id: &str, token: &str) -> (StatusCode, Value) {
        self.post(
            "/api/v1/confirmations",
            json!({ "plan_id": plan_id, "token": token }),
        )
        .await
    }

    /// Fetch audit records for an inclusive sequence range.
    pub async fn audit(&self, from: u64, to: u64) -> Vec<Value> {
        let (status, json) = self.get(&format!("/api/v1/audit?from={from}&to={to}")).await;
        assert_eq!(status, StatusCode::OK);
        json.as_array().unwrap().clone()
    }

    /// Current row count of `table`, read straight from the store.
    pub async fn row_count(&self, table: &str) -> usize {
        self.state.store.row_count(table).await.unwrap()
    }

    pub async fn rows(&self, table: &str) -> Vec<cq_protocol::Row> {
        self.state.store.read_rows(table, &RowFilter::All).await.unwrap()
    }
}
