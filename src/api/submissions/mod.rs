mod student;
mod teacher;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::security::Role;
use crate::core::state::AppState;
use crate::schemas::submission::SubmissionResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        // Student endpoints
        .route("/exams/:exam_id/start", post(student::start_or_resume))
        .route("/my", get(student::list_my_submissions))
        .route("/:submission_id/answers", put(student::save_answers))
        .route("/:submission_id/submit", post(student::submit))
        .route("/:submission_id/violations", post(student::report_violation))
        // Teacher endpoints
        .route("/:submission_id/evaluations/override", post(teacher::override_evaluations))
        .route("/:submission_id/publish", post(teacher::publish))
        .route("/exams/:exam_id/publish-all", post(teacher::publish_all))
        // Shared
        .route("/:submission_id", get(get_submission))
}

/// Teachers get the full record; a student only their own, redacted.
async fn get_submission(
    Path(submission_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let lifecycle = state.lifecycle();
    match user.role {
        Role::Teacher => {
            let submission = lifecycle.get(&submission_id).await?;
            Ok(Json(SubmissionResponse::for_teacher(&submission)))
        }
        Role::Student => {
            lifecycle.ensure_owner(&submission_id, &user.id).await?;
            let submission = lifecycle.get(&submission_id).await?;
            Ok(Json(SubmissionResponse::for_student(&submission)))
        }
    }
}
