use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::db::types::SubmissionType;
use crate::schemas::submission::{
    SaveAnswersRequest, SubmissionResponse, SubmitRequest, ViolationRequest, ViolationResponse,
};
use crate::services::answer_merge::AnswerPatch;

pub(super) async fn start_or_resume(
    Path(exam_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state.lifecycle().start_or_resume(&exam_id, &user.id).await?;
    Ok(Json(SubmissionResponse::for_student(&submission)))
}

pub(super) async fn list_my_submissions(
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let submissions = state.lifecycle().list_for_student(&user.id).await?;
    Ok(Json(submissions.iter().map(SubmissionResponse::for_student).collect()))
}

pub(super) async fn save_answers(
    Path(submission_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let lifecycle = state.lifecycle();
    lifecycle.ensure_owner(&submission_id, &user.id).await?;

    let patches: Vec<AnswerPatch> = payload.answers.into_iter().map(AnswerPatch::from).collect();
    let submission = lifecycle
        .save_answers(&submission_id, &patches, payload.marked_for_review.as_deref())
        .await?;
    Ok(Json(SubmissionResponse::for_student(&submission)))
}

/// The body is optional; a bare POST is a manual submit with no last-second answers.
pub(super) async fn submit(
    Path(submission_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
    payload: Option<Json<SubmitRequest>>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let lifecycle = state.lifecycle();
    lifecycle.ensure_owner(&submission_id, &user.id).await?;

    let submission_type = payload.submission_type.unwrap_or(SubmissionType::Manual);
    let patches: Vec<AnswerPatch> = payload.answers.into_iter().map(AnswerPatch::from).collect();
    let submission = lifecycle.submit(&submission_id, submission_type, &patches).await?;
    Ok(Json(SubmissionResponse::for_student(&submission)))
}

/// Proctoring clients fire and forget, so anything short of a bad token
/// answers 200 with a zero count.
pub(super) async fn report_violation(
    Path(submission_id): Path<String>,
    CurrentStudent(user): CurrentStudent,
    State(state): State<AppState>,
    payload: Option<Json<ViolationRequest>>,
) -> Json<ViolationResponse> {
    let ignored = Json(ViolationResponse { violation_count: 0, status: None });

    let Some(Json(payload)) = payload else {
        return ignored;
    };
    if let Err(err) = payload.validate() {
        tracing::debug!(
            submission_id = %submission_id,
            error = %err,
            "Malformed violation ignored"
        );
        return ignored;
    }

    let lifecycle = state.lifecycle();
    if let Err(err) = lifecycle.ensure_owner(&submission_id, &user.id).await {
        tracing::debug!(submission_id = %submission_id, error = %err, "Violation report rejected");
        return ignored;
    }

    let report = lifecycle.report_violation(&submission_id, &payload.kind).await;
    Json(ViolationResponse {
        violation_count: report.violation_count,
        status: report.submission.map(|submission| submission.status),
    })
}
