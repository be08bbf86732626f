mod commands;
mod queries;
mod types;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{AnswerSlot, Evaluation, Submission, Violation};
use crate::db::types::SubmissionType;

use super::RepoResult;

/// Persistence port for submissions.
///
/// Every status-changing write is conditional on the status the caller
/// expects and returns `None` when that condition no longer holds, so two
/// writers racing on the same submission cannot both succeed. Totals are
/// always recomputed here from the evaluations being stored.
#[async_trait]
pub(crate) trait SubmissionRepository: Send + Sync {
    /// Returns `false` if a submission for the same exam and student already exists.
    async fn create_if_absent(&self, submission: &Submission) -> RepoResult<bool>;

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Submission>>;

    async fn find_by_exam_and_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> RepoResult<Option<Submission>>;

    async fn list_by_student(&self, student_id: &str) -> RepoResult<Vec<Submission>>;

    /// Only applies while the submission is in progress.
    async fn update_answers(
        &self,
        id: &str,
        answers: &[AnswerSlot],
        marked_for_review: Option<&[String]>,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>>;

    /// Appends in any status and returns the new violation count.
    async fn append_violation(
        &self,
        id: &str,
        violation: &Violation,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<usize>>;

    /// in_progress -> submitted, optionally replacing the answer slots in the same write.
    async fn mark_submitted(
        &self,
        id: &str,
        submission_type: SubmissionType,
        answers: Option<&[AnswerSlot]>,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>>;

    /// submitted -> evaluated, only when no evaluations are stored yet.
    async fn store_evaluations(
        &self,
        id: &str,
        evaluations: &[Evaluation],
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>>;

    /// Rewrites evaluations of an evaluated or published submission without changing status.
    async fn replace_evaluations(
        &self,
        id: &str,
        evaluations: &[Evaluation],
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>>;

    /// evaluated -> published.
    async fn mark_published(&self, id: &str, now: PrimitiveDateTime)
        -> RepoResult<Option<Submission>>;

    async fn publish_all_evaluated(&self, exam_id: &str, now: PrimitiveDateTime)
        -> RepoResult<u64>;
}

#[derive(Clone)]
pub(crate) struct PgSubmissionRepository {
    pool: PgPool,
}

impl PgSubmissionRepository {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionRepository for PgSubmissionRepository {
    async fn create_if_absent(&self, submission: &Submission) -> RepoResult<bool> {
        Ok(commands::create_if_absent(&self.pool, submission).await?)
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Submission>> {
        Ok(queries::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_exam_and_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> RepoResult<Option<Submission>> {
        Ok(queries::find_by_exam_and_student(&self.pool, exam_id, student_id).await?)
    }

    async fn list_by_student(&self, student_id: &str) -> RepoResult<Vec<Submission>> {
        Ok(queries::list_by_student(&self.pool, student_id).await?)
    }

    async fn update_answers(
        &self,
        id: &str,
        answers: &[AnswerSlot],
        marked_for_review: Option<&[String]>,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(commands::update_answers(&self.pool, id, answers, marked_for_review, now).await?)
    }

    async fn append_violation(
        &self,
        id: &str,
        violation: &Violation,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<usize>> {
        let count = commands::append_violation(&self.pool, id, violation, now).await?;
        Ok(count.map(|value| value.max(0) as usize))
    }

    async fn mark_submitted(
        &self,
        id: &str,
        submission_type: SubmissionType,
        answers: Option<&[AnswerSlot]>,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(commands::mark_submitted(&self.pool, id, submission_type, answers, now).await?)
    }

    async fn store_evaluations(
        &self,
        id: &str,
        evaluations: &[Evaluation],
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(commands::store_evaluations(&self.pool, id, evaluations, now).await?)
    }

    async fn replace_evaluations(
        &self,
        id: &str,
        evaluations: &[Evaluation],
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(commands::replace_evaluations(&self.pool, id, evaluations, now).await?)
    }

    async fn mark_published(
        &self,
        id: &str,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(commands::mark_published(&self.pool, id, now).await?)
    }

    async fn publish_all_evaluated(
        &self,
        exam_id: &str,
        now: PrimitiveDateTime,
    ) -> RepoResult<u64> {
        Ok(commands::publish_all_evaluated(&self.pool, exam_id, now).await?)
    }
}
