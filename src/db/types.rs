use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "submissionstatus", rename_all = "snake_case")]
pub(crate) enum SubmissionStatus {
    InProgress,
    Submitted,
    Evaluated,
    Published,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal submission transition from {from} to {to}")]
pub(crate) struct TransitionError {
    pub(crate) from: &'static str,
    pub(crate) to: &'static str,
}

impl SubmissionStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::InProgress => "in-progress",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Evaluated => "evaluated",
            SubmissionStatus::Published => "published",
        }
    }

    /// The only forward edges. Anything else, including staying put, is illegal.
    pub(crate) fn can_advance_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (InProgress, Submitted) | (Submitted, Evaluated) | (Evaluated, Published) => true,
            (InProgress, _) | (Submitted, _) | (Evaluated, _) | (Published, _) => false,
        }
    }

    pub(crate) fn advance(
        self,
        next: SubmissionStatus,
    ) -> Result<SubmissionStatus, TransitionError> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self.as_str(), to: next.as_str() })
        }
    }

    pub(crate) fn is_evaluated(self) -> bool {
        matches!(self, SubmissionStatus::Evaluated | SubmissionStatus::Published)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "submissiontype", rename_all = "lowercase")]
pub(crate) enum SubmissionType {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    MultipleChoice,
    Subjective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum EvaluatorKind {
    Automatic,
    DelegatedAi,
    Teacher,
    SystemFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Strictness {
    Lenient,
    Balanced,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReviewTone {
    Encouraging,
    Neutral,
    Formal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ExpectedLength {
    Brief,
    Moderate,
    Detailed,
}
