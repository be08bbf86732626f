use sqlx::PgPool;

use crate::db::models::Submission;

use super::types::COLUMNS;

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_exam_and_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE exam_id = $1 AND student_id = $2"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE student_id = $1
         ORDER BY started_at DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}
