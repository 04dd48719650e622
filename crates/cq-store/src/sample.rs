//! Small clinical-trial dataset used for demos and tests.
//!
//! Four tables (`patients`, `adverse_events`, `lab_results`, `visits`) with
//! deliberate quality problems: missing ages and severities, one fully
//! duplicated patient row, mixed date formats and out-of-range labs.

use cq_protocol::{ColumnDef, ColumnType, SemanticRole, TableSchema, Value};

use crate::error::StoreResult;
use crate::memory::{MemoryStore, TableData};

const N: Value = Value::Null;

fn t(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn r(x: f64) -> Value {
    Value::Real(x)
}

fn i(n: i64) -> Value {
    Value::Int(n)
}

fn b(v: bool) -> Value {
    Value::Bool(v)
}

fn col(name: &str, ty: ColumnType, role: SemanticRole) -> ColumnDef {
    ColumnDef::new(name, ty, role)
}

pub fn patients() -> StoreResult<TableData> {
    use ColumnType::*;
    use SemanticRole::*;
    let schema = TableSchema::new(
        "patients",
        vec![
            col("patient_id", Text, Identifier),
            col("site_id", Text, Category),
            col("age", Real, Measurement),
            col("gender", Text, Category),
            col("blood_type", Text, Category),
            col("enrollment_date", Date, Timestamp),
            col("treatment_arm", Text, Category),
            col("status", Text, Category),
        ],
    )?;
    let rows = vec![
        vec![t("P001"), t("SITE01"), r(54.0), t("Female"), t("A+"), t("2024-01-15"), t("Placebo"), t("Active")],
        vec![t("P002"), t("SITE01"), r(67.0), t("Male"), t("O-"), t("2024-01-22"), t("Drug A 10mg"), t("Active")],
        vec![t("P003"), t("SITE02"), r(45.0), t("Female"), t("B+"), t("05/02/2024"), t("Drug A 20mg"), t("Completed")],
        vec![t("P003"), t("SITE02"), r(45.0), t("Female"), t("B+"), t("05/02/2024"), t("Drug A 20mg"), t("Completed")],
        vec![t("P004"), t("SITE02"), r(72.0), t("Male"), t("AB+"), t("2024-02-10"), t("Placebo"), t("Withdrawn")],
        vec![t("P005"), t("SITE03"), N, t("Female"), t("O+"), t("2024/02/18"), t("Drug A 10mg"), t("Active")],
        vec![t("P006"), t("SITE03"), r(38.0), t("Male"), N, t("03/01/2024"), t("Drug A 20mg"), t("Active")],
        vec![t("P007"), t("SITE01"), r(61.0), t("Female"), t("A-"), t("12 Mar 2024"), t("Placebo"), t("Completed")],
        vec![t("P008"), t("SITE04"), r(29.0), t("Male"), t("O+"), t("2024-03-20"), t("Drug A 10mg"), t("Active")],
        vec![t("P009"), t("SITE04"), N, t("Female"), t("B-"), t("2024-04-02"), t("Drug A 20mg"), t("Screen Failed")],
        vec![t("P010"), t("SITE02"), r(58.5), t("Male"), t("A+"), t("2024-04-11"), t("Placebo"), t("Active")],
        vec![t("P011"), t("SITE03"), r(80.0), t("Female"), t("O-"), t("2024-04-25"), t("Drug A 10mg"), t("Active")],
    ];
    TableData::new(schema, rows)
}

pub fn adverse_events() -> StoreResult<TableData> {
    use ColumnType::*;
    use SemanticRole::*;
    let schema = TableSchema::new(
        "adverse_events",
        vec![
            col("event_id", Integer, Identifier),
            col("patient_id", Text, Identifier),
            col("event_term", Text, Free),
            col("severity", Text, Category),
            col("event_date", Date, Timestamp),
            col("resolved", Text, Category),
        ],
    )?;
    let rows = vec![
        vec![i(1), t("P001"), t("Headache"), t("Mild"), t("2024-02-01"), t("Yes")],
        vec![i(2), t("P002"), t("Nausea"), t("Moderate"), t("2024-02-03"), t("Yes")],
        vec![i(3), t("P002"), t("Dizziness"), N, t("2024-02-09"), t("No")],
        vec![i(4), t("P004"), t("Rash"), t("Severe"), t("2024-02-20"), N],
        vec![i(5), t("P007"), t("Fatigue"), t("Mild"), t("2024-03-18"), t("Yes")],
        vec![i(6), t("P008"), t("Insomnia"), t("Moderate"), t("2024-04-01"), t("No")],
        vec![i(7), t("P011"), t("Elevated liver enzymes"), t("Severe"), t("2024-05-02"), t("No")],
    ];
    TableData::new(schema, rows)
}

pub fn lab_results() -> StoreResult<TableData> {
    use ColumnType::*;
    use SemanticRole::*;
    let schema = TableSchema::new(
        "lab_results",
        vec![
            col("lab_id", Integer, Identifier),
            col("patient_id", Text, Identifier),
            col("test_name", Text, Category),
            col("test_value", Real, Measurement),
            col("unit", Text, Category),
            col("test_date", Date, Timestamp),
            col("normal_range_low", Real, Measurement),
            col("normal_range_high", Real, Measurement),
        ],
    )?;
    let rows = vec![
        vec![i(1), t("P001"), t("Hemoglobin"), r(13.5), t("g/dL"), t("2024-01-20"), r(12.0), r(16.0)],
        vec![i(2), t("P002"), t("ALT"), r(88.0), t("U/L"), t("2024-01-25"), r(7.0), r(56.0)],
        vec![i(3), t("P003"), t("Glucose"), r(92.0), t("mg/dL"), t("2024-02-08"), r(70.0), r(100.0)],
        vec![i(4), t("P004"), t("Creatinine"), r(1.1), t("mg/dL"), t("2024-02-12"), r(0.6), r(1.3)],
        vec![i(5), t("P005"), t("Hemoglobin"), N, t("g/dL"), t("2024-02-20"), r(12.0), r(16.0)],
        vec![i(6), t("P007"), t("Platelets"), r(95.0), t("10^3/uL"), t("2024-03-14"), r(150.0), r(400.0)],
        vec![i(7), t("P008"), t("Glucose"), r(85.0), t("mg/dL"), t("2024-03-22"), r(70.0), r(100.0)],
        vec![i(8), t("P011"), t("ALT"), r(41.0), t("U/L"), t("2024-04-28"), r(7.0), r(56.0)],
    ];
    TableData::new(schema, rows)
}

pub fn visits() -> StoreResult<TableData> {
    use ColumnType::*;
    use SemanticRole::*;
    let schema = TableSchema::new(
        "visits",
        vec![
            col("visit_id", Integer, Identifier),
            col("patient_id", Text, Identifier),
            col("visit_number", Integer, Measurement),
            col("visit_type", Text, Category),
            col("scheduled_date", Date, Timestamp),
            col("visit_date", Date, Timestamp),
            col("completed", Boolean, Category),
        ],
    )?;
    let rows = vec![
        vec![i(1), t("P001"), i(1), t("Screening"), t("2024-01-10"), t("2024-01-10"), b(true)],
        vec![i(2), t("P001"), i(2), t("Baseline"), t("2024-01-15"), t("2024-01-16"), b(true)],
        vec![i(3), t("P002"), i(1), t("Screening"), t("2024-01-18"), t("2024-01-18"), b(true)],
        vec![i(4), t("P004"), i(2), t("Week 4"), t("2024-03-08"), N, b(false)],
        vec![i(5), t("P007"), i(3), t("Week 8"), t("2024-05-06"), t("2024-05-20"), b(true)],
        vec![i(6), t("P008"), i(1), t("Screening"), t("2024-03-15"), t("2024-03-15"), b(true)],
    ];
    TableData::new(schema, rows)
}

/// All four sample tables.
pub fn clinical_tables() -> StoreResult<Vec<TableData>> {
    Ok(vec![patients()?, adverse_events()?, lab_results()?, visits()?])
}

/// A `MemoryStore` holding the sample tables.
pub fn clinical_store() -> StoreResult<MemoryStore> {
    Ok(MemoryStore::with_tables(clinical_tables()?))
}
