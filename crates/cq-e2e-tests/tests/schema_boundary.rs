//! E2E tests for schema registration and evolution outside the
//! instruction path.

mod helpers;

use axum::http::StatusCode;
use cq_engine::EngineConfig;
use cq_store::MemoryStore;
use serde_json::json;

use helpers::TestHarness;

#[tokio::test]
async fn e2e_empty_store_rejects_instructions() {
    let h = TestHarness::with_store(EngineConfig::default(), MemoryStore::new()).await;

    let (_, health) = h.get("/health").await;
    assert_eq!(health["tables"], 0);

    let (status, json) = h.submit("Show patients older than 60").await;
    assert!(status.is_client_error(), "{json}");
}

#[tokio::test]
async fn e2e_uploaded_table_is_queryable() {
    let h = TestHarness::with_store(EngineConfig::default(), MemoryStore::new()).await;

    let (status, _) = h
        .post(
            "/api/v1/schemas",
            json!({
                "schema": {
                    "name": "vitals",
                    "columns": [
                        {"name": "subject_id", "type": "text", "role": "identifier"},
                        {"name": "heart_rate", "type": "real", "role": "measurement"}
                    ]
                },
                "rows": [["S1", 72.0], ["S2", 95.0], ["S3", null], ["S4", 110.0]]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = h.submit("Show vitals where heart_rate > 90").await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["result"]["rows"].as_array().unwrap().len(), 2);

    let (status, report) = h.get("/api/v1/quality/vitals").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["missing"][1]["missing"], 1);
}

#[tokio::test]
async fn e2e_added_column_is_null_filled() {
    let h = TestHarness::with_sample_data().await;

    let (status, json) = h
        .post(
            "/api/v1/schemas/visits/changes",
            json!({
                "change": "add_column",
                "column": {"name": "notes", "type": "text", "role": "free"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["columns"].as_array().unwrap().last().unwrap()["name"], "notes");

    let rows = h.rows("visits").await;
    assert!(rows.iter().all(|r| r.last().unwrap().is_null()));

    let (_, health) = h.get("/health").await;
    assert_eq!(health["schema_version"], 5);
}

#[tokio::test]
async fn e2e_evolving_unknown_table_fails() {
    let h = TestHarness::with_sample_data().await;

    let (status, json) = h
        .post(
            "/api/v1/schemas/nowhere/changes",
            json!({"change": "rename_column", "from": "a", "to": "b"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "schema_error");
}
