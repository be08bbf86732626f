use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Exam, Question};
use crate::db::types::ExamStatus;

use super::RepoResult;

pub(crate) const COLUMNS: &str = "\
    id, title, start_time, end_time, duration_minutes, status, policy, \
    created_by, created_at, updated_at";

pub(crate) const QUESTION_COLUMNS: &str = "\
    id, exam_id, order_index, text, question_type, max_marks, options, \
    reference_answer, policy";

/// Read access to exams plus the two status sweeps the scheduler runs.
/// Both sweeps are single filtered statements, so overlapping ticks are safe.
#[async_trait]
pub(crate) trait ExamRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Exam>>;

    /// Questions in display order.
    async fn list_questions(&self, exam_id: &str) -> RepoResult<Vec<Question>>;

    /// Flips every active exam whose end time has passed to completed.
    async fn complete_ended(&self, now: PrimitiveDateTime) -> RepoResult<u64>;

    /// Deletes draft exams with no questions created before the cutoff.
    async fn purge_empty_drafts(&self, created_before: PrimitiveDateTime) -> RepoResult<u64>;
}

#[derive(Clone)]
pub(crate) struct PgExamRepository {
    pool: PgPool,
}

impl PgExamRepository {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamRepository for PgExamRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Exam>> {
        let exam = sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exam)
    }

    async fn list_questions(&self, exam_id: &str) -> RepoResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index, id"
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn complete_ended(&self, now: PrimitiveDateTime) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE exams
             SET status = $1, updated_at = $2
             WHERE status = $3
               AND end_time IS NOT NULL
               AND end_time <= $2",
        )
        .bind(ExamStatus::Completed)
        .bind(now)
        .bind(ExamStatus::Active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_empty_drafts(&self, created_before: PrimitiveDateTime) -> RepoResult<u64> {
        let result = sqlx::query(
            "DELETE FROM exams e
             WHERE e.status = $1
               AND e.created_at < $2
               AND NOT EXISTS (SELECT 1 FROM questions q WHERE q.exam_id = e.id)",
        )
        .bind(ExamStatus::Draft)
        .bind(created_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
