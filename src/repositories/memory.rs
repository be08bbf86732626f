use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::{total_marks, AnswerSlot, Evaluation, Exam, Question, Submission, Violation};
use crate::db::types::{ExamStatus, SubmissionStatus, SubmissionType};

use super::{ExamRepository, RepoResult, SubmissionRepository};

/// Process-local store backing both repository ports. Each write holds the
/// table lock for the whole check-and-update, which gives the same
/// conditional-write semantics as the PostgreSQL statements.
#[derive(Default)]
pub(crate) struct MemoryStore {
    exams: Mutex<HashMap<String, Exam>>,
    questions: Mutex<HashMap<String, Vec<Question>>>,
    submissions: Mutex<HashMap<String, Submission>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers an exam together with its questions, replacing any previous copy.
    pub(crate) fn put_exam(&self, exam: Exam, mut questions: Vec<Question>) {
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        lock(&self.questions).insert(exam.id.clone(), questions);
        lock(&self.exams).insert(exam.id.clone(), exam);
    }

    #[cfg(test)]
    pub(crate) fn exam_status(&self, exam_id: &str) -> Option<ExamStatus> {
        lock(&self.exams).get(exam_id).map(|exam| exam.status)
    }

    /// Moves a submission's start time into the past.
    #[cfg(test)]
    pub(crate) fn rewind_start(&self, submission_id: &str, by: time::Duration) {
        if let Some(submission) = lock(&self.submissions).get_mut(submission_id) {
            submission.started_at -= by;
        }
    }

    fn update_where<F>(
        &self,
        id: &str,
        allowed: impl Fn(&Submission) -> bool,
        apply: F,
    ) -> Option<Submission>
    where
        F: FnOnce(&mut Submission),
    {
        let mut submissions = lock(&self.submissions);
        let submission = submissions.get_mut(id)?;
        if !allowed(submission) {
            return None;
        }
        apply(submission);
        Some(submission.clone())
    }
}

#[async_trait]
impl ExamRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Exam>> {
        Ok(lock(&self.exams).get(id).cloned())
    }

    async fn list_questions(&self, exam_id: &str) -> RepoResult<Vec<Question>> {
        Ok(lock(&self.questions).get(exam_id).cloned().unwrap_or_default())
    }

    async fn complete_ended(&self, now: PrimitiveDateTime) -> RepoResult<u64> {
        let mut updated = 0;
        for exam in lock(&self.exams).values_mut() {
            let ended = exam.end_time.is_some_and(|end| end <= now);
            if exam.status == ExamStatus::Active && ended {
                exam.status = ExamStatus::Completed;
                exam.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn purge_empty_drafts(&self, created_before: PrimitiveDateTime) -> RepoResult<u64> {
        let mut questions = lock(&self.questions);
        let mut exams = lock(&self.exams);
        let stale: Vec<String> = exams
            .values()
            .filter(|exam| exam.status == ExamStatus::Draft && exam.created_at < created_before)
            .filter(|exam| questions.get(&exam.id).map_or(true, Vec::is_empty))
            .map(|exam| exam.id.clone())
            .collect();
        for id in &stale {
            exams.remove(id);
            questions.remove(id);
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl SubmissionRepository for MemoryStore {
    async fn create_if_absent(&self, submission: &Submission) -> RepoResult<bool> {
        let mut submissions = lock(&self.submissions);
        let exists = submissions.values().any(|existing| {
            existing.exam_id == submission.exam_id && existing.student_id == submission.student_id
        });
        if exists || submissions.contains_key(&submission.id) {
            return Ok(false);
        }
        submissions.insert(submission.id.clone(), submission.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Submission>> {
        Ok(lock(&self.submissions).get(id).cloned())
    }

    async fn find_by_exam_and_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> RepoResult<Option<Submission>> {
        Ok(lock(&self.submissions)
            .values()
            .find(|submission| submission.exam_id == exam_id && submission.student_id == student_id)
            .cloned())
    }

    async fn list_by_student(&self, student_id: &str) -> RepoResult<Vec<Submission>> {
        let mut items: Vec<Submission> = lock(&self.submissions)
            .values()
            .filter(|submission| submission.student_id == student_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(items)
    }

    async fn update_answers(
        &self,
        id: &str,
        answers: &[AnswerSlot],
        marked_for_review: Option<&[String]>,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(self.update_where(
            id,
            |submission| submission.status == SubmissionStatus::InProgress,
            |submission| {
                submission.answers = Json(answers.to_vec());
                if let Some(marked) = marked_for_review {
                    submission.marked_for_review = Json(marked.to_vec());
                }
                submission.updated_at = now;
            },
        ))
    }

    async fn append_violation(
        &self,
        id: &str,
        violation: &Violation,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<usize>> {
        let mut submissions = lock(&self.submissions);
        let Some(submission) = submissions.get_mut(id) else {
            return Ok(None);
        };
        submission.violations.0.push(violation.clone());
        submission.updated_at = now;
        Ok(Some(submission.violation_count()))
    }

    async fn mark_submitted(
        &self,
        id: &str,
        submission_type: SubmissionType,
        answers: Option<&[AnswerSlot]>,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(self.update_where(
            id,
            |submission| submission.status == SubmissionStatus::InProgress,
            |submission| {
                submission.status = SubmissionStatus::Submitted;
                submission.submission_type = Some(submission_type);
                if let Some(answers) = answers {
                    submission.answers = Json(answers.to_vec());
                }
                submission.submitted_at = Some(now);
                submission.updated_at = now;
            },
        ))
    }

    async fn store_evaluations(
        &self,
        id: &str,
        evaluations: &[Evaluation],
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(self.update_where(
            id,
            |submission| {
                submission.status == SubmissionStatus::Submitted
                    && submission.evaluations.0.is_empty()
            },
            |submission| {
                submission.status = SubmissionStatus::Evaluated;
                submission.evaluations = Json(evaluations.to_vec());
                submission.total_marks = total_marks(evaluations);
                submission.evaluated_at = Some(now);
                submission.updated_at = now;
            },
        ))
    }

    async fn replace_evaluations(
        &self,
        id: &str,
        evaluations: &[Evaluation],
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(self.update_where(
            id,
            |submission| submission.status.is_evaluated(),
            |submission| {
                submission.evaluations = Json(evaluations.to_vec());
                submission.total_marks = total_marks(evaluations);
                submission.updated_at = now;
            },
        ))
    }

    async fn mark_published(
        &self,
        id: &str,
        now: PrimitiveDateTime,
    ) -> RepoResult<Option<Submission>> {
        Ok(self.update_where(
            id,
            |submission| submission.status == SubmissionStatus::Evaluated,
            |submission| {
                submission.status = SubmissionStatus::Published;
                submission.published_at = Some(now);
                submission.updated_at = now;
            },
        ))
    }

    async fn publish_all_evaluated(
        &self,
        exam_id: &str,
        now: PrimitiveDateTime,
    ) -> RepoResult<u64> {
        let mut updated = 0;
        for submission in lock(&self.submissions).values_mut() {
            if submission.exam_id == exam_id && submission.status == SubmissionStatus::Evaluated {
                submission.status = SubmissionStatus::Published;
                submission.published_at = Some(now);
                submission.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
