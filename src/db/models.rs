use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    EvaluatorKind, ExamStatus, ExpectedLength, QuestionType, ReviewTone, Strictness,
    SubmissionStatus, SubmissionType,
};

/// One fixed answer placeholder. The set of slots is decided when the
/// submission is created; only the response fields ever change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AnswerSlot {
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) response_text: Option<String>,
    #[serde(default)]
    pub(crate) response_option: Option<String>,
}

impl AnswerSlot {
    pub(crate) fn empty(question_id: impl Into<String>) -> Self {
        Self { question_id: question_id.into(), response_text: None, response_option: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Violation {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) occurred_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum AutomaticTag {
    Graded,
    Unanswered,
    UnknownOption,
    EmptyAnswer,
}

/// Diagnostic record of how a mark was produced. Each case carries only the
/// fields that make sense for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub(crate) enum EvaluationMeta {
    Automatic {
        tag: AutomaticTag,
    },
    AiSuccess {
        correlation_id: String,
        score_100: f64,
        attempts: u32,
        model: String,
        answer_truncated: bool,
    },
    AiFallbackConfig {
        correlation_id: String,
        heuristic_score_100: f64,
        answer_truncated: bool,
    },
    AiFallbackError {
        correlation_id: String,
        reason: String,
        attempts: u32,
        heuristic_score_100: f64,
        answer_truncated: bool,
    },
    TeacherOverride {
        overridden_by: String,
        previous_marks: i32,
        previous_evaluator: EvaluatorKind,
    },
}

impl EvaluationMeta {
    pub(crate) fn evaluator(&self) -> EvaluatorKind {
        match self {
            EvaluationMeta::Automatic { .. } => EvaluatorKind::Automatic,
            EvaluationMeta::AiSuccess { .. } => EvaluatorKind::DelegatedAi,
            EvaluationMeta::AiFallbackConfig { .. } | EvaluationMeta::AiFallbackError { .. } => {
                EvaluatorKind::SystemFallback
            }
            EvaluationMeta::TeacherOverride { .. } => EvaluatorKind::Teacher,
        }
    }

    pub(crate) fn is_fallback(&self) -> bool {
        self.evaluator() == EvaluatorKind::SystemFallback
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Evaluation {
    pub(crate) question_id: String,
    pub(crate) evaluator: EvaluatorKind,
    pub(crate) marks: i32,
    pub(crate) remarks: String,
    pub(crate) evaluated_at: PrimitiveDateTime,
    pub(crate) meta: EvaluationMeta,
}

impl Evaluation {
    pub(crate) fn new(
        question_id: impl Into<String>,
        marks: i32,
        remarks: impl Into<String>,
        meta: EvaluationMeta,
        evaluated_at: PrimitiveDateTime,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            evaluator: meta.evaluator(),
            marks,
            remarks: remarks.into(),
            evaluated_at,
            meta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) answers: Json<Vec<AnswerSlot>>,
    pub(crate) evaluations: Json<Vec<Evaluation>>,
    pub(crate) violations: Json<Vec<Violation>>,
    pub(crate) marked_for_review: Json<Vec<String>>,
    pub(crate) status: SubmissionStatus,
    pub(crate) submission_type: Option<SubmissionType>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) evaluated_at: Option<PrimitiveDateTime>,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) total_marks: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Submission {
    pub(crate) fn violation_count(&self) -> usize {
        self.violations.0.len()
    }
}

pub(crate) fn total_marks(evaluations: &[Evaluation]) -> i32 {
    evaluations.iter().map(|evaluation| evaluation.marks).sum()
}

/// Teacher-configured scoring guidance. Every field is optional so the same
/// shape serves the exam-level policy and per-question overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EvaluationPolicy {
    #[serde(default)]
    pub(crate) strictness: Option<Strictness>,
    #[serde(default)]
    pub(crate) review_tone: Option<ReviewTone>,
    #[serde(default)]
    pub(crate) expected_length: Option<ExpectedLength>,
    #[serde(default)]
    pub(crate) custom_instructions: Option<String>,
}

impl EvaluationPolicy {
    /// Question-level fields win over exam-level ones.
    pub(crate) fn merged_with(&self, question: &EvaluationPolicy) -> EvaluationPolicy {
        EvaluationPolicy {
            strictness: question.strictness.or(self.strictness),
            review_tone: question.review_tone.or(self.review_tone),
            expected_length: question.expected_length.or(self.expected_length),
            custom_instructions: question
                .custom_instructions
                .clone()
                .filter(|text| !text.trim().is_empty())
                .or_else(|| self.custom_instructions.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) duration_minutes: i32,
    pub(crate) status: ExamStatus,
    pub(crate) policy: Json<EvaluationPolicy>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Exam {
    pub(crate) fn accepts_attempts_at(&self, now: PrimitiveDateTime) -> bool {
        self.status == ExamStatus::Active
            && now >= self.start_time
            && self.end_time.map_or(true, |end| now < end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) order_index: i32,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) max_marks: i32,
    pub(crate) options: Json<Vec<QuestionOption>>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) policy: Json<EvaluationPolicy>,
}
