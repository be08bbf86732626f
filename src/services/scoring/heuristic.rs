/// Upper bound of the stand-in score, before weighting.
pub(crate) const HEURISTIC_CEILING: f64 = 20.0;

/// Length and structure based stand-in used when the external scorer cannot
/// be consulted. It only rewards effort, so it stays well below a pass.
pub(crate) fn score(answer: &str) -> f64 {
    let words = answer.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let sentences = answer
        .split(|ch| matches!(ch, '.' | '!' | '?'))
        .filter(|part| !part.trim().is_empty())
        .count()
        .max(1);

    let length_part = (words as f64 / 20.0).min(10.0);
    let structure_part = (sentences as f64).min(5.0);
    (5.0 + length_part + structure_part).min(HEURISTIC_CEILING)
}

pub(crate) fn remark(answer: &str) -> String {
    if answer.trim().is_empty() {
        return "No answer was provided.".to_string();
    }
    "Automatic scoring was unavailable, so a provisional heuristic score was applied. \
     This answer is flagged for teacher review."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_answer_scores_zero() {
        assert_eq!(score("   "), 0.0);
        assert_eq!(remark(""), "No answer was provided.");
    }

    #[test]
    fn score_stays_under_ceiling() {
        let long = "This is a sentence with several words. ".repeat(200);
        let value = score(&long);
        assert!(value > 0.0);
        assert!(value <= HEURISTIC_CEILING);
        assert!(remark(&long).contains("teacher review"));
    }

    #[test]
    fn longer_answers_score_at_least_as_high() {
        assert!(score("Short answer.") <= score(&"Longer structured answer. ".repeat(10)));
    }
}
