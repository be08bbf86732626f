use crate::db::models::EvaluationPolicy;
use crate::db::types::{ExpectedLength, ReviewTone, Strictness};

pub(crate) const SYSTEM_PROMPT: &str = "You are an experienced examiner scoring one student \
answer. Reply with a single JSON object of the form \
{\"score\": <integer 0-100>, \"review\": \"<at most three sentences>\"} \
and nothing else: no markdown, no code fences, no text before or after the object.";

/// Natural-language rendering of the scoring policy.
pub(crate) fn policy_summary(policy: &EvaluationPolicy) -> String {
    let strictness = match policy.strictness.unwrap_or(Strictness::Balanced) {
        Strictness::Lenient => "Be lenient: reward partial understanding generously.",
        Strictness::Balanced => {
            "Apply balanced judgement: credit correct ideas, deduct for clear errors."
        }
        Strictness::Strict => "Be strict: award high scores only to complete and precise answers.",
    };
    let tone = match policy.review_tone.unwrap_or(ReviewTone::Neutral) {
        ReviewTone::Encouraging => "Write the review in an encouraging tone.",
        ReviewTone::Neutral => "Write the review in a neutral tone.",
        ReviewTone::Formal => "Write the review in a formal tone.",
    };

    let mut lines = vec![strictness.to_string(), tone.to_string()];
    if let Some(length) = policy.expected_length {
        let expectation = match length {
            ExpectedLength::Brief => "A brief answer of a few sentences is expected.",
            ExpectedLength::Moderate => {
                "An answer of moderate length, about a paragraph, is expected."
            }
            ExpectedLength::Detailed => "A detailed, well-developed answer is expected.",
        };
        lines.push(expectation.to_string());
    }
    if let Some(custom) = policy.custom_instructions.as_deref().map(str::trim) {
        if !custom.is_empty() {
            lines.push(format!("Additional instructions from the teacher: {custom}"));
        }
    }
    lines.join("\n")
}

pub(crate) fn build_user_prompt(
    question_text: &str,
    answer: &str,
    reference_answer: Option<&str>,
    policy: &EvaluationPolicy,
) -> String {
    let mut prompt = format!("Question:\n{}\n\n", question_text.trim());
    if let Some(reference) = reference_answer.map(str::trim).filter(|text| !text.is_empty()) {
        prompt.push_str(&format!("Reference answer:\n{reference}\n\n"));
    }
    prompt.push_str(&format!("Student answer:\n{answer}\n\n"));
    prompt.push_str(&format!("Scoring guidance:\n{}\n\n", policy_summary(policy)));
    prompt.push_str(
        "Return only the JSON object {\"score\": 0-100, \"review\": string}. \
         The score is a percentage of full credit.",
    );
    prompt
}
