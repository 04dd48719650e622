//! E2E tests for the submit → confirm → execute lifecycle over HTTP.

mod helpers;

use axum::http::StatusCode;

use helpers::TestHarness;

/// Dropping rows with missing age waits for confirmation, then removes
/// exactly the two incomplete patients.
#[tokio::test]
async fn e2e_drop_missing_confirmed() {
    let h = TestHarness::with_sample_data().await;

    let (status, held) = h.submit("Remove rows where age is missing").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(held["status"], "needs_confirmation");
    assert_eq!(held["plan"]["operation"]["kind"], "drop_missing");
    assert_eq!(held["plan"]["operation"]["columns"][0], "age");
    assert_eq!(held["estimate"]["rows_affected"], 2);
    assert_eq!(h.row_count("patients").await, 12);

    let plan_id = held["plan_id"].as_str().unwrap();
    let (status, done) = h.confirm(plan_id, "yes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["plan_id"], plan_id);
    assert_eq!(done["summary"]["rows_before"], 12);
    assert_eq!(done["summary"]["rows_after"], 10);
    assert_eq!(done["summary"]["missing_after"], 0);
    assert_eq!(h.row_count("patients").await, 10);

    // The plan is consumed; a second confirmation finds nothing.
    let (status, json) = h.confirm(plan_id, "yes").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "confirmation_unknown");
}

/// A display request with a condition is filtered, never a bare projection.
#[tokio::test]
async fn e2e_display_with_condition_filters() {
    let h = TestHarness::with_sample_data().await;

    let (status, json) = h.submit("Display patients whose gender is 'Male'").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["plan"]["intent"], "filter_rows");
    assert_eq!(json["plan"]["operation"]["kind"], "filter");
    assert_eq!(json["result"]["rows"].as_array().unwrap().len(), 5);

    let (status, json) = h.submit("Show patient_id where age is missing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["columns"], serde_json::json!(["patient_id"]));
    let rows = json["result"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "P005");
    assert_eq!(rows[1][0], "P009");
}

/// A comparison filter returns only matching rows and changes nothing.
#[tokio::test]
async fn e2e_filter_older_than_60() {
    let h = TestHarness::with_sample_data().await;

    let (status, json) = h.submit("Show patients older than 60").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["plan"]["destructive"], false);

    let result = &json["result"];
    let age = result["columns"]
        .as_array()
        .unwrap()
        .iter()
        .position(|c| c == "age")
        .unwrap();
    let rows = result["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r[age].as_f64().unwrap() > 60.0));
    assert_eq!(h.row_count("patients").await, 12);
}

/// The same instruction compiles to the same plan id every time.
#[tokio::test]
async fn e2e_plans_are_deterministic() {
    let h = TestHarness::with_sample_data().await;

    let (_, a) = h.submit("Show patients older than 60").await;
    let (_, b) = h.submit("Show patients older than 60").await;
    assert_eq!(a["plan_id"], b["plan_id"]);
    assert_eq!(a["plan"], b["plan"]);
    assert_eq!(b["seq"].as_u64().unwrap(), a["seq"].as_u64().unwrap() + 1);
}

/// Removing duplicates twice leaves the table as after the first run.
#[tokio::test]
async fn e2e_dedup_is_idempotent() {
    let h = TestHarness::with_sample_data().await;

    let (_, held) = h.submit("Remove duplicate patients").await;
    let (status, first) = h.confirm(held["plan_id"].as_str().unwrap(), "confirm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["summary"]["rows_affected"], 1);
    let after_first = h.rows("patients").await;
    assert_eq!(after_first.len(), 11);

    let (_, held) = h.submit("Remove duplicate patients").await;
    assert_eq!(held["estimate"]["rows_affected"], 0);
    let (_, second) = h.confirm(held["plan_id"].as_str().unwrap(), "confirm").await;
    assert_eq!(second["summary"]["rows_affected"], 0);
    assert_eq!(h.rows("patients").await, after_first);
}

/// Date standardization rewrites every parseable date to ISO.
#[tokio::test]
async fn e2e_standardize_dates() {
    let h = TestHarness::with_sample_data().await;

    let (status, held) = h.submit("Standardize enrollment_date to YYYY-MM-DD").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(held["plan"]["operation"]["kind"], "standardize");

    let (status, _) = h.confirm(held["plan_id"].as_str().unwrap(), "proceed").await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = h.submit("Show patient_id and enrollment_date from patients").await;
    let rows = json["result"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 12);
    for row in rows {
        let date = row[1].as_str().unwrap();
        assert_eq!(date.len(), 10, "{date}");
        assert!(date.starts_with("2024-"), "{date}");
    }
}

/// Rename evolves the live schema; later instructions resolve the new name.
#[tokio::test]
async fn e2e_rename_then_query_new_name() {
    let h = TestHarness::with_sample_data().await;

    let (_, held) = h.submit("Rename age to age_years").await;
    let (status, done) = h.confirm(held["plan_id"].as_str().unwrap(), "yes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["summary"]["rows_affected"], 0);

    let (_, schemas) = h.get("/api/v1/schemas").await;
    let patients = schemas["tables"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "patients")
        .unwrap();
    assert!(
        patients["columns"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["name"] == "age_years")
    );

    let (status, json) = h.submit("how many patients have missing age_years").await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["result"]["rows"][0][0], 2);
}
