//! Applies client answer batches to the fixed slot set of a submission.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::db::models::AnswerSlot;

/// One incoming answer. Absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AnswerPatch {
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) response_text: Option<String>,
    #[serde(default)]
    pub(crate) response_option: Option<String>,
}

/// Overwrites only the fields present in each patch. Patches for questions
/// outside the slot set are dropped; size and order never change.
pub(crate) fn merge_answers(existing: &[AnswerSlot], incoming: &[AnswerPatch]) -> Vec<AnswerSlot> {
    let mut merged = existing.to_vec();
    let index: HashMap<&str, usize> = existing
        .iter()
        .enumerate()
        .map(|(position, slot)| (slot.question_id.as_str(), position))
        .collect();

    for patch in incoming {
        let Some(&position) = index.get(patch.question_id.as_str()) else {
            continue;
        };
        let slot = &mut merged[position];
        if let Some(text) = &patch.response_text {
            slot.response_text = Some(text.clone());
        }
        if let Some(option) = &patch.response_option {
            slot.response_option = Some(option.clone());
        }
    }

    merged
}

/// Keeps references to known slots only, first occurrence wins.
pub(crate) fn normalize_review_marks(slots: &[AnswerSlot], incoming: &[String]) -> Vec<String> {
    let known: HashSet<&str> = slots.iter().map(|slot| slot.question_id.as_str()).collect();
    let mut seen = HashSet::new();
    incoming
        .iter()
        .filter(|question_id| known.contains(question_id.as_str()))
        .filter(|question_id| seen.insert(question_id.as_str()))
        .cloned()
        .collect()
}
