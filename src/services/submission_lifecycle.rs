//! The submission state machine.
//!
//! Every operation takes the per-submission lock, loads the record, and runs
//! the deadline guard before doing its own work. Status changes go through
//! the repositories' conditional writes; when one misses, the record was
//! advanced elsewhere and the current copy is returned instead.

use std::collections::HashSet;

use anyhow::anyhow;
use sqlx::types::Json;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::locks::KeyedLocks;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerSlot, Evaluation, EvaluationMeta, Exam, Submission};
use crate::db::types::{SubmissionStatus, SubmissionType, TransitionError};
use crate::repositories::{RepositoryError, Repositories};
use crate::services::answer_merge::{merge_answers, normalize_review_marks, AnswerPatch};
use crate::services::deadline;
use crate::services::evaluation::EvaluationDispatcher;
use crate::services::violations;

#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("submission belongs to another student")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    /// The submission's current status does not allow the operation.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RepositoryError> for LifecycleError {
    fn from(err: RepositoryError) -> Self {
        LifecycleError::Internal(anyhow::Error::new(err))
    }
}

impl From<TransitionError> for LifecycleError {
    fn from(err: TransitionError) -> Self {
        LifecycleError::Conflict(err.to_string())
    }
}

type LifecycleResult<T> = Result<T, LifecycleError>;

/// What caused an attempt to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeTrigger {
    Manual,
    Deadline,
    Violations,
    System,
}

impl FinalizeTrigger {
    fn as_str(self) -> &'static str {
        match self {
            FinalizeTrigger::Manual => "manual",
            FinalizeTrigger::Deadline => "deadline",
            FinalizeTrigger::Violations => "violations",
            FinalizeTrigger::System => "system",
        }
    }

    fn submission_type(self) -> SubmissionType {
        match self {
            FinalizeTrigger::Manual => SubmissionType::Manual,
            _ => SubmissionType::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TeacherOverride {
    pub(crate) question_id: String,
    pub(crate) marks: i32,
    pub(crate) remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ViolationReport {
    pub(crate) violation_count: usize,
    pub(crate) submission: Option<Submission>,
}

struct Settled {
    submission: Submission,
    finalized_now: bool,
}

pub(crate) struct SubmissionLifecycle {
    repos: Repositories,
    dispatcher: EvaluationDispatcher,
    locks: KeyedLocks,
}

impl SubmissionLifecycle {
    pub(crate) fn new(repos: Repositories, dispatcher: EvaluationDispatcher) -> Self {
        Self { repos, dispatcher, locks: KeyedLocks::default() }
    }

    /// Creates the attempt on first call; later calls return the existing one
    /// after the deadline guard has run.
    pub(crate) async fn start_or_resume(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> LifecycleResult<Submission> {
        let exam =
            self.repos.exams.find_by_id(exam_id).await?.ok_or(LifecycleError::NotFound("exam"))?;

        if let Some(existing) =
            self.repos.submissions.find_by_exam_and_student(exam_id, student_id).await?
        {
            return self.settle_by_id(&existing.id, Some(&exam)).await;
        }

        let now = primitive_now_utc();
        if !exam.accepts_attempts_at(now) {
            return Err(LifecycleError::Validation("exam is not accepting attempts".to_string()));
        }
        let questions = self.repos.exams.list_questions(exam_id).await?;
        if questions.is_empty() {
            return Err(LifecycleError::Validation("exam has no questions".to_string()));
        }

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            exam_id: exam.id.clone(),
            student_id: student_id.to_string(),
            answers: Json(
                questions.iter().map(|question| AnswerSlot::empty(&question.id)).collect(),
            ),
            evaluations: Json(Vec::new()),
            violations: Json(Vec::new()),
            marked_for_review: Json(Vec::new()),
            status: SubmissionStatus::InProgress,
            submission_type: None,
            started_at: now,
            duration_minutes: exam.duration_minutes,
            submitted_at: None,
            evaluated_at: None,
            published_at: None,
            total_marks: 0,
            created_at: now,
            updated_at: now,
        };

        if !self.repos.submissions.create_if_absent(&submission).await? {
            let existing = self
                .repos
                .submissions
                .find_by_exam_and_student(exam_id, student_id)
                .await?
                .ok_or_else(|| anyhow!("submission for exam {exam_id} vanished after conflict"))?;
            return self.settle_by_id(&existing.id, Some(&exam)).await;
        }

        metrics::counter!("submissions_started_total").increment(1);
        tracing::info!(
            submission_id = %submission.id,
            exam_id = %exam.id,
            student_id = %student_id,
            slots = submission.answers.0.len(),
            "Submission started"
        );
        Ok(submission)
    }

    pub(crate) async fn save_answers(
        &self,
        submission_id: &str,
        patches: &[AnswerPatch],
        review_marks: Option<&[String]>,
    ) -> LifecycleResult<Submission> {
        let _guard = self.locks.acquire(submission_id).await;
        let (submission, exam) = self.load(submission_id).await?;
        let settled = self.settle(submission, &exam).await?;
        if settled.finalized_now {
            return Ok(settled.submission);
        }
        let submission = settled.submission;
        if submission.status != SubmissionStatus::InProgress {
            return Err(LifecycleError::Conflict("submission is no longer in progress".to_string()));
        }

        let merged = merge_answers(&submission.answers.0, patches);
        let marks = review_marks.map(|marks| normalize_review_marks(&merged, marks));
        let updated = self
            .repos
            .submissions
            .update_answers(submission_id, &merged, marks.as_deref(), primitive_now_utc())
            .await?;

        match updated {
            Some(updated) => Ok(updated),
            None => self.reload(submission_id).await,
        }
    }

    /// Closes the attempt and evaluates it. Calling it again on a closed
    /// attempt returns the stored record without new evaluation work.
    pub(crate) async fn submit(
        &self,
        submission_id: &str,
        submission_type: SubmissionType,
        final_answers: &[AnswerPatch],
    ) -> LifecycleResult<Submission> {
        let _guard = self.locks.acquire(submission_id).await;
        let (submission, exam) = self.load(submission_id).await?;

        match submission.status {
            SubmissionStatus::Evaluated | SubmissionStatus::Published => Ok(submission),
            SubmissionStatus::Submitted => self.evaluate_locked(submission, &exam).await,
            SubmissionStatus::InProgress => {
                if self.expired(&submission, &exam, primitive_now_utc()) {
                    return self
                        .finalize_locked(submission, &exam, FinalizeTrigger::Deadline, None)
                        .await;
                }
                let trigger = match submission_type {
                    SubmissionType::Manual => FinalizeTrigger::Manual,
                    SubmissionType::Auto => FinalizeTrigger::System,
                };
                let merged = merge_answers(&submission.answers.0, final_answers);
                self.finalize_locked(submission, &exam, trigger, Some(merged)).await
            }
        }
    }

    /// Records a proctoring signal. Never fails: lookup or storage problems
    /// are logged and reported as a zero count.
    pub(crate) async fn report_violation(
        &self,
        submission_id: &str,
        kind: &str,
    ) -> ViolationReport {
        let _guard = self.locks.acquire(submission_id).await;
        let now = primitive_now_utc();
        let violation = violations::record(kind, now);

        let count = match self
            .repos
            .submissions
            .append_violation(submission_id, &violation, now)
            .await
        {
            Ok(Some(count)) => count,
            Ok(None) => {
                tracing::debug!(submission_id, "Violation for unknown submission ignored");
                return ViolationReport { violation_count: 0, submission: None };
            }
            Err(err) => {
                tracing::error!(submission_id, error = %err, "Failed to record violation");
                return ViolationReport { violation_count: 0, submission: None };
            }
        };
        metrics::counter!("violations_reported_total").increment(1);
        tracing::info!(submission_id, kind = %violation.kind, count, "Violation recorded");

        let submission = match self.enforce_violation_policy(submission_id, count, now).await {
            Ok(submission) => Some(submission),
            Err(err) => {
                tracing::error!(submission_id, error = %err, "Failed to apply violation policy");
                None
            }
        };
        ViolationReport { violation_count: count, submission }
    }

    /// Replaces marks of individual questions. Status is left unchanged.
    pub(crate) async fn apply_teacher_override(
        &self,
        submission_id: &str,
        teacher_id: &str,
        overrides: &[TeacherOverride],
    ) -> LifecycleResult<Submission> {
        if overrides.is_empty() {
            return Err(LifecycleError::Validation("no overrides given".to_string()));
        }
        let mut seen = HashSet::with_capacity(overrides.len());
        if let Some(duplicate) =
            overrides.iter().find(|item| !seen.insert(item.question_id.as_str()))
        {
            return Err(LifecycleError::Validation(format!(
                "question {} is overridden more than once",
                duplicate.question_id
            )));
        }

        let _guard = self.locks.acquire(submission_id).await;
        let (submission, exam) = self.load(submission_id).await?;
        if !submission.status.is_evaluated() {
            return Err(LifecycleError::Conflict(
                "submission has not been evaluated yet".to_string(),
            ));
        }

        let questions = self.repos.exams.list_questions(&exam.id).await?;
        let now = primitive_now_utc();
        let mut evaluations = submission.evaluations.0.clone();

        for item in overrides {
            if !submission.answers.0.iter().any(|slot| slot.question_id == item.question_id) {
                return Err(LifecycleError::Validation(format!(
                    "question {} is not part of this submission",
                    item.question_id
                )));
            }
            let question = questions
                .iter()
                .find(|question| question.id == item.question_id)
                .ok_or_else(|| anyhow!("question {} is missing", item.question_id))?;
            if item.marks < 0 || item.marks > question.max_marks {
                return Err(LifecycleError::Validation(format!(
                    "marks for question {} must be between 0 and {}",
                    item.question_id, question.max_marks
                )));
            }

            let position = evaluations
                .iter()
                .position(|evaluation| evaluation.question_id == item.question_id)
                .ok_or_else(|| anyhow!("evaluation for question {} is missing", item.question_id))?;
            let previous = &evaluations[position];
            let remarks = item
                .remarks
                .clone()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| previous.remarks.clone());
            let meta = EvaluationMeta::TeacherOverride {
                overridden_by: teacher_id.to_string(),
                previous_marks: previous.marks,
                previous_evaluator: previous.evaluator,
            };
            evaluations[position] =
                Evaluation::new(&item.question_id, item.marks, remarks, meta, now);
        }

        let updated = self
            .repos
            .submissions
            .replace_evaluations(submission_id, &evaluations, now)
            .await?
            .ok_or_else(|| {
                LifecycleError::Conflict("submission is no longer evaluated".to_string())
            })?;

        tracing::info!(
            submission_id,
            teacher_id,
            overrides = overrides.len(),
            total_marks = updated.total_marks,
            "Evaluations overridden"
        );
        Ok(updated)
    }

    pub(crate) async fn publish(&self, submission_id: &str) -> LifecycleResult<Submission> {
        let _guard = self.locks.acquire(submission_id).await;
        let (submission, exam) = self.load(submission_id).await?;

        match submission.status {
            SubmissionStatus::Published => Ok(submission),
            SubmissionStatus::InProgress | SubmissionStatus::Submitted => {
                self.settle(submission, &exam).await?;
                Err(LifecycleError::Conflict(
                    "only evaluated submissions can be published".to_string(),
                ))
            }
            SubmissionStatus::Evaluated => {
                submission.status.advance(SubmissionStatus::Published)?;
                let now = primitive_now_utc();
                match self.repos.submissions.mark_published(submission_id, now).await? {
                    Some(published) => {
                        tracing::info!(submission_id, "Submission published");
                        Ok(published)
                    }
                    None => self.reload(submission_id).await,
                }
            }
        }
    }

    pub(crate) async fn publish_all_evaluated(&self, exam_id: &str) -> LifecycleResult<u64> {
        self.repos.exams.find_by_id(exam_id).await?.ok_or(LifecycleError::NotFound("exam"))?;
        let count =
            self.repos.submissions.publish_all_evaluated(exam_id, primitive_now_utc()).await?;
        tracing::info!(exam_id, count, "Evaluated submissions published");
        Ok(count)
    }

    pub(crate) async fn get(&self, submission_id: &str) -> LifecycleResult<Submission> {
        self.settle_by_id(submission_id, None).await
    }

    pub(crate) async fn list_for_student(
        &self,
        student_id: &str,
    ) -> LifecycleResult<Vec<Submission>> {
        let submissions = self.repos.submissions.list_by_student(student_id).await?;
        let mut settled = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let open = matches!(
                submission.status,
                SubmissionStatus::InProgress | SubmissionStatus::Submitted
            );
            if !open {
                settled.push(submission);
                continue;
            }
            match self.settle_by_id(&submission.id, None).await {
                Ok(current) => settled.push(current),
                Err(err) => {
                    // One broken exam must not hide the student's other attempts.
                    tracing::error!(
                        submission_id = %submission.id,
                        error = %err,
                        "Failed to settle submission while listing"
                    );
                    let current = self.repos.submissions.find_by_id(&submission.id).await?;
                    settled.push(current.unwrap_or(submission));
                }
            }
        }
        Ok(settled)
    }

    pub(crate) async fn ensure_owner(
        &self,
        submission_id: &str,
        student_id: &str,
    ) -> LifecycleResult<()> {
        let submission = self
            .repos
            .submissions
            .find_by_id(submission_id)
            .await?
            .ok_or(LifecycleError::NotFound("submission"))?;
        if submission.student_id != student_id {
            return Err(LifecycleError::Forbidden);
        }
        Ok(())
    }

    async fn enforce_violation_policy(
        &self,
        submission_id: &str,
        count: usize,
        now: PrimitiveDateTime,
    ) -> LifecycleResult<Submission> {
        let (submission, exam) = self.load(submission_id).await?;
        if submission.status != SubmissionStatus::InProgress {
            return self.settle(submission, &exam).await.map(|settled| settled.submission);
        }
        if self.expired(&submission, &exam, now) {
            return self.finalize_locked(submission, &exam, FinalizeTrigger::Deadline, None).await;
        }
        if violations::exceeds_threshold(count) {
            tracing::warn!(submission_id, count, "Violation threshold exceeded");
            return self.finalize_locked(submission, &exam, FinalizeTrigger::Violations, None).await;
        }
        Ok(submission)
    }

    async fn settle_by_id(
        &self,
        submission_id: &str,
        exam: Option<&Exam>,
    ) -> LifecycleResult<Submission> {
        let _guard = self.locks.acquire(submission_id).await;
        let submission = self.reload(submission_id).await?;
        let settled = match exam {
            Some(exam) => self.settle(submission, exam).await?,
            None => {
                let exam = self.exam_of(&submission).await?;
                self.settle(submission, &exam).await?
            }
        };
        Ok(settled.submission)
    }

    /// Deadline guard. Expired open attempts are auto-finalized and attempts
    /// left in `submitted` by an interrupted evaluation are evaluated.
    async fn settle(&self, submission: Submission, exam: &Exam) -> LifecycleResult<Settled> {
        match submission.status {
            SubmissionStatus::InProgress
                if self.expired(&submission, exam, primitive_now_utc()) =>
            {
                let submission =
                    self.finalize_locked(submission, exam, FinalizeTrigger::Deadline, None).await?;
                Ok(Settled { submission, finalized_now: true })
            }
            SubmissionStatus::Submitted => {
                let submission = self.evaluate_locked(submission, exam).await?;
                Ok(Settled { submission, finalized_now: false })
            }
            _ => Ok(Settled { submission, finalized_now: false }),
        }
    }

    async fn finalize_locked(
        &self,
        submission: Submission,
        exam: &Exam,
        trigger: FinalizeTrigger,
        answers: Option<Vec<AnswerSlot>>,
    ) -> LifecycleResult<Submission> {
        submission.status.advance(SubmissionStatus::Submitted)?;
        let now = primitive_now_utc();
        let marked = self
            .repos
            .submissions
            .mark_submitted(&submission.id, trigger.submission_type(), answers.as_deref(), now)
            .await?;

        let Some(submitted) = marked else {
            tracing::debug!(
                submission_id = %submission.id,
                "Submission already advanced elsewhere"
            );
            let current = self.reload(&submission.id).await?;
            return self.evaluate_locked(current, exam).await;
        };

        metrics::counter!("submissions_finalized_total", "trigger" => trigger.as_str())
            .increment(1);
        tracing::info!(
            submission_id = %submitted.id,
            exam_id = %submitted.exam_id,
            trigger = trigger.as_str(),
            "Submission finalized"
        );
        self.evaluate_locked(submitted, exam).await
    }

    async fn evaluate_locked(
        &self,
        submission: Submission,
        exam: &Exam,
    ) -> LifecycleResult<Submission> {
        if submission.status != SubmissionStatus::Submitted
            || !submission.evaluations.0.is_empty()
        {
            return Ok(submission);
        }
        submission.status.advance(SubmissionStatus::Evaluated)?;

        let questions = self.repos.exams.list_questions(&exam.id).await?;
        let now = primitive_now_utc();
        let evaluations =
            self.dispatcher.evaluate_all(exam, &questions, &submission.answers.0, now).await?;

        match self.repos.submissions.store_evaluations(&submission.id, &evaluations, now).await? {
            Some(evaluated) => {
                let fallbacks =
                    evaluated.evaluations.0.iter().filter(|item| item.meta.is_fallback()).count();
                tracing::info!(
                    submission_id = %evaluated.id,
                    total_marks = evaluated.total_marks,
                    fallbacks,
                    "Submission evaluated"
                );
                Ok(evaluated)
            }
            None => self.reload(&submission.id).await,
        }
    }

    async fn load(&self, submission_id: &str) -> LifecycleResult<(Submission, Exam)> {
        let submission = self.reload(submission_id).await?;
        let exam = self.exam_of(&submission).await?;
        Ok((submission, exam))
    }

    async fn reload(&self, submission_id: &str) -> LifecycleResult<Submission> {
        self.repos
            .submissions
            .find_by_id(submission_id)
            .await?
            .ok_or(LifecycleError::NotFound("submission"))
    }

    async fn exam_of(&self, submission: &Submission) -> LifecycleResult<Exam> {
        let exam = self.repos.exams.find_by_id(&submission.exam_id).await?.ok_or_else(|| {
            anyhow!("exam {} of submission {} is missing", submission.exam_id, submission.id)
        })?;
        Ok(exam)
    }

    fn expired(&self, submission: &Submission, exam: &Exam, now: PrimitiveDateTime) -> bool {
        deadline::is_expired(now, submission.started_at, submission.duration_minutes, exam.end_time)
    }
}

#[cfg(test)]
mod tests;
