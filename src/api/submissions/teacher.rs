use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::schemas::submission::{
    EvaluationOverrideRequest, PublishAllResponse, SubmissionResponse,
};
use crate::services::submission_lifecycle::TeacherOverride;

pub(super) async fn override_evaluations(
    Path(submission_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<EvaluationOverrideRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let overrides: Vec<TeacherOverride> =
        payload.overrides.into_iter().map(TeacherOverride::from).collect();
    let submission =
        state.lifecycle().apply_teacher_override(&submission_id, &teacher.id, &overrides).await?;
    Ok(Json(SubmissionResponse::for_teacher(&submission)))
}

pub(super) async fn publish(
    Path(submission_id): Path<String>,
    CurrentTeacher(_teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state.lifecycle().publish(&submission_id).await?;
    Ok(Json(SubmissionResponse::for_teacher(&submission)))
}

pub(super) async fn publish_all(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<PublishAllResponse>, ApiError> {
    let published = state.lifecycle().publish_all_evaluated(&exam_id).await?;
    tracing::info!(
        exam_id = %exam_id,
        teacher_id = %teacher.id,
        published,
        "Bulk publish requested"
    );
    Ok(Json(PublishAllResponse { published }))
}
