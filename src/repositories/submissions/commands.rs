use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{total_marks, AnswerSlot, Evaluation, Submission, Violation};
use crate::db::types::{SubmissionStatus, SubmissionType};

use super::types::COLUMNS;

/// Returns `false` when a submission for the same (exam, student) already exists.
pub(crate) async fn create_if_absent(
    pool: &PgPool,
    submission: &Submission,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO submissions (
            id, exam_id, student_id, answers, evaluations, violations, marked_for_review,
            status, submission_type, started_at, duration_minutes, total_marks,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9, $10, 0, $11, $11)
        ON CONFLICT (exam_id, student_id) DO NOTHING",
    )
    .bind(&submission.id)
    .bind(&submission.exam_id)
    .bind(&submission.student_id)
    .bind(&submission.answers)
    .bind(&submission.evaluations)
    .bind(&submission.violations)
    .bind(&submission.marked_for_review)
    .bind(submission.status)
    .bind(submission.started_at)
    .bind(submission.duration_minutes)
    .bind(submission.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn update_answers(
    pool: &PgPool,
    id: &str,
    answers: &[AnswerSlot],
    marked_for_review: Option<&[String]>,
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET answers = $1,
             marked_for_review = COALESCE($2, marked_for_review),
             updated_at = $3
         WHERE id = $4 AND status = $5
         RETURNING {COLUMNS}"
    ))
    .bind(Json(answers))
    .bind(marked_for_review.map(Json))
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn append_violation(
    pool: &PgPool,
    id: &str,
    violation: &Violation,
    now: PrimitiveDateTime,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE submissions
         SET violations = violations || jsonb_build_array($1::jsonb),
             updated_at = $2
         WHERE id = $3
         RETURNING jsonb_array_length(violations)",
    )
    .bind(Json(violation))
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn mark_submitted(
    pool: &PgPool,
    id: &str,
    submission_type: SubmissionType,
    answers: Option<&[AnswerSlot]>,
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $1,
             submission_type = $2,
             answers = COALESCE($3, answers),
             submitted_at = $4,
             updated_at = $4
         WHERE id = $5 AND status = $6
         RETURNING {COLUMNS}"
    ))
    .bind(SubmissionStatus::Submitted)
    .bind(submission_type)
    .bind(answers.map(Json))
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn store_evaluations(
    pool: &PgPool,
    id: &str,
    evaluations: &[Evaluation],
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $1,
             evaluations = $2,
             total_marks = $3,
             evaluated_at = $4,
             updated_at = $4
         WHERE id = $5
           AND status = $6
           AND jsonb_array_length(evaluations) = 0
         RETURNING {COLUMNS}"
    ))
    .bind(SubmissionStatus::Evaluated)
    .bind(Json(evaluations))
    .bind(total_marks(evaluations))
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Submitted)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn replace_evaluations(
    pool: &PgPool,
    id: &str,
    evaluations: &[Evaluation],
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET evaluations = $1,
             total_marks = $2,
             updated_at = $3
         WHERE id = $4 AND status IN ($5, $6)
         RETURNING {COLUMNS}"
    ))
    .bind(Json(evaluations))
    .bind(total_marks(evaluations))
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Evaluated)
    .bind(SubmissionStatus::Published)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn mark_published(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $1,
             published_at = $2,
             updated_at = $2
         WHERE id = $3 AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(SubmissionStatus::Published)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Evaluated)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn publish_all_evaluated(
    pool: &PgPool,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             published_at = $2,
             updated_at = $2
         WHERE exam_id = $3 AND status = $4",
    )
    .bind(SubmissionStatus::Published)
    .bind(now)
    .bind(exam_id)
    .bind(SubmissionStatus::Evaluated)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
