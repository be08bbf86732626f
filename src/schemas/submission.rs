use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerSlot, Evaluation, EvaluationMeta, Submission};
use crate::db::types::{EvaluatorKind, SubmissionStatus, SubmissionType};
use crate::services::answer_merge::AnswerPatch;
use crate::services::submission_lifecycle::TeacherOverride;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerPayload {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    #[validate(length(max = 50000, message = "response_text must be at most 50000 characters"))]
    pub(crate) response_text: Option<String>,
    #[serde(default)]
    pub(crate) response_option: Option<String>,
}

impl From<AnswerPayload> for AnswerPatch {
    fn from(payload: AnswerPayload) -> Self {
        AnswerPatch {
            question_id: payload.question_id,
            response_text: payload.response_text,
            response_option: payload.response_option,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswersRequest {
    #[serde(default)]
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerPayload>,
    #[serde(default)]
    pub(crate) marked_for_review: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    pub(crate) submission_type: Option<SubmissionType>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerPayload>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ViolationRequest {
    #[serde(rename = "type", default)]
    #[validate(length(max = 64, message = "type must be at most 64 characters"))]
    pub(crate) kind: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationResponse {
    pub(crate) violation_count: usize,
    pub(crate) status: Option<SubmissionStatus>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub(crate) struct OverrideItem {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[validate(range(min = 0, message = "marks must be non-negative"))]
    pub(crate) marks: i32,
    #[serde(default)]
    pub(crate) remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct EvaluationOverrideRequest {
    #[validate(length(min = 1, message = "overrides must not be empty"), nested)]
    pub(crate) overrides: Vec<OverrideItem>,
}

impl From<OverrideItem> for TeacherOverride {
    fn from(item: OverrideItem) -> Self {
        TeacherOverride { question_id: item.question_id, marks: item.marks, remarks: item.remarks }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishAllResponse {
    pub(crate) published: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationResponse {
    pub(crate) question_id: String,
    pub(crate) marks: i32,
    pub(crate) remarks: String,
    pub(crate) evaluated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) evaluator: Option<EvaluatorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<EvaluationMeta>,
}

impl EvaluationResponse {
    fn from_evaluation(evaluation: &Evaluation, audit: bool) -> Self {
        Self {
            question_id: evaluation.question_id.clone(),
            marks: evaluation.marks,
            remarks: evaluation.remarks.clone(),
            evaluated_at: format_primitive(evaluation.evaluated_at),
            evaluator: audit.then_some(evaluation.evaluator),
            meta: audit.then(|| evaluation.meta.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) submission_type: Option<SubmissionType>,
    pub(crate) answers: Vec<AnswerSlot>,
    pub(crate) marked_for_review: Vec<String>,
    pub(crate) violation_count: usize,
    pub(crate) duration_minutes: i32,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) evaluated_at: Option<String>,
    pub(crate) published_at: Option<String>,
    pub(crate) evaluations: Option<Vec<EvaluationResponse>>,
    pub(crate) total_marks: Option<i32>,
}

impl SubmissionResponse {
    /// Students see marks only once published, and never the scoring audit trail.
    pub(crate) fn for_student(submission: &Submission) -> Self {
        let visible = submission.status == SubmissionStatus::Published;
        Self::build(submission, visible, false)
    }

    pub(crate) fn for_teacher(submission: &Submission) -> Self {
        Self::build(submission, submission.status.is_evaluated(), true)
    }

    fn build(submission: &Submission, show_marks: bool, audit: bool) -> Self {
        Self {
            id: submission.id.clone(),
            exam_id: submission.exam_id.clone(),
            student_id: submission.student_id.clone(),
            status: submission.status,
            submission_type: submission.submission_type,
            answers: submission.answers.0.clone(),
            marked_for_review: submission.marked_for_review.0.clone(),
            violation_count: submission.violation_count(),
            duration_minutes: submission.duration_minutes,
            started_at: format_primitive(submission.started_at),
            submitted_at: submission.submitted_at.map(format_primitive),
            evaluated_at: submission.evaluated_at.map(format_primitive),
            published_at: submission.published_at.map(format_primitive),
            evaluations: show_marks.then(|| {
                submission
                    .evaluations
                    .0
                    .iter()
                    .map(|evaluation| EvaluationResponse::from_evaluation(evaluation, audit))
                    .collect()
            }),
            total_marks: show_marks.then_some(submission.total_marks),
        }
    }
}
