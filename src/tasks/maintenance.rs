use anyhow::{Context, Result};
use time::{Duration, PrimitiveDateTime};

use crate::repositories::ExamRepository;

/// Flips active exams past their end time to completed.
pub(crate) async fn complete_ended_exams(
    exams: &dyn ExamRepository,
    now: PrimitiveDateTime,
) -> Result<u64> {
    let completed =
        exams.complete_ended(now).await.context("Failed to complete ended exams")?;

    if completed > 0 {
        tracing::info!(completed_exams = completed, "Completed ended exams");
    }
    metrics::counter!("exams_completed_total").increment(completed);

    Ok(completed)
}

/// Removes question-less drafts older than `max_age`.
pub(crate) async fn purge_stale_drafts(
    exams: &dyn ExamRepository,
    now: PrimitiveDateTime,
    max_age: Duration,
) -> Result<u64> {
    let purged = exams
        .purge_empty_drafts(now - max_age)
        .await
        .context("Failed to purge stale draft exams")?;

    if purged > 0 {
        tracing::info!(purged_drafts = purged, "Purged stale draft exams");
    }
    metrics::counter!("draft_exams_purged_total").increment(purged);

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ExamStatus;
    use crate::repositories::MemoryStore;
    use crate::test_support;
    use time::macros::datetime;

    const NOW: PrimitiveDateTime = datetime!(2026-03-01 12:00);

    #[tokio::test]
    async fn completes_only_active_exams_past_their_end() {
        let store = MemoryStore::new();
        let opened = datetime!(2026-03-01 9:00);
        store.put_exam(
            test_support::active_exam("ended", opened, Some(datetime!(2026-03-01 11:00)), 30),
            Vec::new(),
        );
        store.put_exam(
            test_support::active_exam("running", opened, Some(datetime!(2026-03-01 13:00)), 30),
            Vec::new(),
        );
        store.put_exam(test_support::active_exam("open", opened, None, 30), Vec::new());

        assert_eq!(complete_ended_exams(&store, NOW).await.unwrap(), 1);
        assert_eq!(store.exam_status("ended"), Some(ExamStatus::Completed));
        assert_eq!(store.exam_status("running"), Some(ExamStatus::Active));
        assert_eq!(store.exam_status("open"), Some(ExamStatus::Active));

        assert_eq!(complete_ended_exams(&store, NOW).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purges_old_empty_drafts_only() {
        let store = MemoryStore::new();
        let draft = |id: &str, created_at: PrimitiveDateTime| {
            let mut exam = test_support::active_exam(id, created_at, None, 30);
            exam.status = ExamStatus::Draft;
            exam
        };
        store.put_exam(draft("old-empty", datetime!(2026-02-27 12:00)), Vec::new());
        store.put_exam(draft("fresh-empty", datetime!(2026-03-01 11:00)), Vec::new());
        store.put_exam(
            draft("old-with-questions", datetime!(2026-02-27 12:00)),
            vec![test_support::choice_question("old-with-questions", "q1", 0, 1)],
        );

        assert_eq!(purge_stale_drafts(&store, NOW, Duration::hours(24)).await.unwrap(), 1);
        assert_eq!(store.exam_status("old-empty"), None);
        assert_eq!(store.exam_status("fresh-empty"), Some(ExamStatus::Draft));
        assert_eq!(store.exam_status("old-with-questions"), Some(ExamStatus::Draft));
    }
}
