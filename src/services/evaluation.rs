use std::collections::HashMap;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use time::PrimitiveDateTime;

use crate::db::models::{
    AnswerSlot, AutomaticTag, Evaluation, EvaluationMeta, EvaluationPolicy, Exam, Question,
};
use crate::db::types::QuestionType;
use crate::services::scoring::{ScoreRequest, ScoringClient};

/// Routes every answer slot to the scorer matching its question type.
#[derive(Debug, Clone)]
pub(crate) struct EvaluationDispatcher {
    scoring: ScoringClient,
}

impl EvaluationDispatcher {
    pub(crate) fn new(scoring: ScoringClient) -> Self {
        Self { scoring }
    }

    /// Scores all slots concurrently. Returns one evaluation per slot in slot
    /// order; a slot whose question cannot be resolved is a data error.
    pub(crate) async fn evaluate_all(
        &self,
        exam: &Exam,
        questions: &[Question],
        answers: &[AnswerSlot],
        now: PrimitiveDateTime,
    ) -> Result<Vec<Evaluation>> {
        let by_id: HashMap<&str, &Question> =
            questions.iter().map(|question| (question.id.as_str(), question)).collect();

        let mut resolved = Vec::with_capacity(answers.len());
        for slot in answers {
            let question = by_id.get(slot.question_id.as_str()).copied().ok_or_else(|| {
                anyhow!("question {} referenced by exam {} is missing", slot.question_id, exam.id)
            })?;
            if question.question_type == QuestionType::Subjective
                && question.text.trim().is_empty()
            {
                return Err(anyhow!("question {} has no text", question.id));
            }
            resolved.push((question, slot));
        }

        let exam_policy = &exam.policy.0;
        let evaluations = join_all(
            resolved
                .into_iter()
                .map(|(question, slot)| self.evaluate_slot(exam_policy, question, slot, now)),
        )
        .await;

        Ok(evaluations)
    }

    async fn evaluate_slot(
        &self,
        exam_policy: &EvaluationPolicy,
        question: &Question,
        slot: &AnswerSlot,
        now: PrimitiveDateTime,
    ) -> Evaluation {
        match question.question_type {
            QuestionType::MultipleChoice => evaluate_choice(question, slot, now),
            QuestionType::Subjective => {
                let text = slot.response_text.as_deref().unwrap_or_default();
                if text.trim().is_empty() {
                    return automatic(
                        question,
                        0,
                        "No answer was provided.",
                        AutomaticTag::EmptyAnswer,
                        now,
                    );
                }

                let policy = exam_policy.merged_with(&question.policy.0);
                let request = ScoreRequest {
                    question_text: &question.text,
                    answer: text,
                    reference_answer: question.reference_answer.as_deref(),
                    weight: f64::from(question.max_marks) / 100.0,
                    max_marks: question.max_marks,
                    policy: &policy,
                };
                let outcome = self.scoring.score(&request).await;
                Evaluation::new(&question.id, outcome.marks, outcome.remarks, outcome.meta, now)
            }
        }
    }
}

pub(crate) fn evaluate_choice(
    question: &Question,
    slot: &AnswerSlot,
    now: PrimitiveDateTime,
) -> Evaluation {
    let Some(chosen) = slot.response_option.as_deref().filter(|option| !option.trim().is_empty())
    else {
        return automatic(question, 0, "No option selected.", AutomaticTag::Unanswered, now);
    };

    match question.options.0.iter().find(|option| option.id == chosen) {
        Some(option) if option.is_correct => {
            automatic(question, question.max_marks, "Correct answer.", AutomaticTag::Graded, now)
        }
        Some(_) => automatic(question, 0, "Incorrect answer.", AutomaticTag::Graded, now),
        None => automatic(
            question,
            0,
            "Selected option does not belong to this question.",
            AutomaticTag::UnknownOption,
            now,
        ),
    }
}

fn automatic(
    question: &Question,
    marks: i32,
    remarks: &str,
    tag: AutomaticTag,
    now: PrimitiveDateTime,
) -> Evaluation {
    Evaluation::new(&question.id, marks, remarks, EvaluationMeta::Automatic { tag }, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::EvaluatorKind;
    use crate::test_support;
    use time::macros::datetime;

    const NOW: PrimitiveDateTime = datetime!(2026-03-01 10:00);

    fn slot(question_id: &str, text: Option<&str>, option: Option<&str>) -> AnswerSlot {
        AnswerSlot {
            question_id: question_id.to_string(),
            response_text: text.map(str::to_string),
            response_option: option.map(str::to_string),
        }
    }

    #[test]
    fn choice_marks_follow_the_correct_flag() {
        let question = test_support::choice_question("e1", "q1", 0, 4);

        let right = evaluate_choice(&question, &slot("q1", None, Some("b")), NOW);
        assert_eq!(right.marks, 4);
        assert_eq!(right.evaluator, EvaluatorKind::Automatic);

        let wrong = evaluate_choice(&question, &slot("q1", None, Some("a")), NOW);
        assert_eq!(wrong.marks, 0);
        assert_eq!(wrong.meta, EvaluationMeta::Automatic { tag: AutomaticTag::Graded });

        let none = evaluate_choice(&question, &slot("q1", None, None), NOW);
        assert_eq!(none.marks, 0);
        assert_eq!(none.meta, EvaluationMeta::Automatic { tag: AutomaticTag::Unanswered });

        let unknown = evaluate_choice(&question, &slot("q1", None, Some("zz")), NOW);
        assert_eq!(unknown.marks, 0);
        assert_eq!(unknown.meta, EvaluationMeta::Automatic { tag: AutomaticTag::UnknownOption });
    }

    #[tokio::test]
    async fn every_slot_gets_one_evaluation_in_order() {
        let dispatcher = test_support::offline_dispatcher();
        let exam = test_support::active_exam("e1", NOW, None, 30);
        let questions = vec![
            test_support::choice_question("e1", "q1", 0, 2),
            test_support::subjective_question("e1", "q2", 1, 10),
            test_support::subjective_question("e1", "q3", 2, 10),
        ];
        let answers = vec![
            slot("q1", None, Some("b")),
            slot("q2", Some("   "), None),
            slot("q3", Some("Diffusion of water through a membrane."), None),
        ];

        let evaluations = dispatcher.evaluate_all(&exam, &questions, &answers, NOW).await.unwrap();
        assert_eq!(evaluations.len(), 3);
        let ids: Vec<&str> = evaluations.iter().map(|item| item.question_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3"]);

        assert_eq!(evaluations[0].marks, 2);
        assert_eq!(
            evaluations[1].meta,
            EvaluationMeta::Automatic { tag: AutomaticTag::EmptyAnswer }
        );
        assert_eq!(evaluations[2].evaluator, EvaluatorKind::SystemFallback);
        assert!(evaluations[2].marks <= 2);
    }

    #[tokio::test]
    async fn missing_question_is_fatal() {
        let dispatcher = test_support::offline_dispatcher();
        let exam = test_support::active_exam("e1", NOW, None, 30);
        let questions = vec![test_support::choice_question("e1", "q1", 0, 2)];
        let answers = vec![slot("q1", None, None), slot("q-gone", None, None)];

        let err = dispatcher.evaluate_all(&exam, &questions, &answers, NOW).await.unwrap_err();
        assert!(err.to_string().contains("q-gone"));
    }
}
