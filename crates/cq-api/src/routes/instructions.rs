//! Instruction submission and confirmation endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use cq_engine::Submission;
use cq_protocol::PlanId;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body for submitting an instruction.
#[derive(Debug, Deserialize)]
pub struct InstructionRequest {
    /// Free-text instruction, e.g. "Remove rows where age is missing".
    pub text: String,
}

/// Request body for answering a confirmation prompt.
#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub plan_id: PlanId,
    /// "yes" / "proceed" to execute, "no" / "cancel" to drop the plan.
    pub token: String,
}

fn status_of(submission: &Submission) -> StatusCode {
    match submission {
        Submission::NeedsConfirmation { .. } => StatusCode::ACCEPTED,
        Submission::Completed { .. } | Submission::Cancelled { .. } => StatusCode::OK,
    }
}

/// POST /api/v1/instructions: translate and run (or hold) an instruction.
pub async fn submit_instruction(
    State(state): State<AppState>,
    Json(req): Json<InstructionRequest>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    let submission = state.engine.submit(&req.text).await?;
    tracing::info!(
        seq = submission.seq(),
        status = submission.label(),
        plan_id = %submission.plan_id(),
        "instruction handled"
    );
    Ok((status_of(&submission), Json(submission)))
}

/// POST /api/v1/confirmations: confirm or cancel a held plan.
pub async fn confirm_plan(
    State(state): State<AppState>,
    Json(req): Json<ConfirmationRequest>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    if req.plan_id.0.trim().is_empty() {
        return Err(ApiError::BadRequest("plan_id must not be empty".into()));
    }
    let submission = state.engine.confirm(&req.plan_id, &req.token).await?;
    Ok((status_of(&submission), Json(submission)))
}
