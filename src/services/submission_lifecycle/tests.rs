use std::sync::Arc;

use serde_json::json;
use time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::db::models::AutomaticTag;
use crate::db::types::EvaluatorKind;
use crate::repositories::SubmissionRepository;
use crate::test_support::{self, LifecycleHarness};

fn patch(question_id: &str, text: Option<&str>, option: Option<&str>) -> AnswerPatch {
    AnswerPatch {
        question_id: question_id.to_string(),
        response_text: text.map(str::to_string),
        response_option: option.map(str::to_string),
    }
}

async fn started(harness: &LifecycleHarness, duration_minutes: i32) -> Submission {
    test_support::seed_open_exam(&harness.store, "exam-1", duration_minutes);
    harness.lifecycle.start_or_resume("exam-1", "student-1").await.expect("start")
}

#[tokio::test]
async fn start_creates_one_empty_slot_per_question() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    assert_eq!(submission.status, SubmissionStatus::InProgress);
    assert_eq!(submission.duration_minutes, 30);
    let ids: Vec<&str> =
        submission.answers.0.iter().map(|slot| slot.question_id.as_str()).collect();
    assert_eq!(ids, vec!["exam-1-q1", "exam-1-q2"]);
    assert!(submission.answers.0.iter().all(|slot| slot.response_text.is_none()));
}

#[tokio::test]
async fn second_start_resumes_the_same_attempt() {
    let harness = test_support::lifecycle_harness();
    let first = started(&harness, 30).await;
    let second = harness.lifecycle.start_or_resume("exam-1", "student-1").await.unwrap();
    assert_eq!(first.id, second.id);

    let other = harness.lifecycle.start_or_resume("exam-1", "student-2").await.unwrap();
    assert_ne!(first.id, other.id);
}

#[tokio::test]
async fn concurrent_starts_yield_a_single_submission() {
    let harness = Arc::new(test_support::lifecycle_harness());
    test_support::seed_open_exam(&harness.store, "exam-1", 30);

    let (a, b) = tokio::join!(
        harness.lifecycle.start_or_resume("exam-1", "student-1"),
        harness.lifecycle.start_or_resume("exam-1", "student-1"),
    );
    assert_eq!(a.unwrap().id, b.unwrap().id);
    assert_eq!(harness.lifecycle.list_for_student("student-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn start_is_rejected_outside_the_window() {
    let harness = test_support::lifecycle_harness();
    let now = primitive_now_utc();

    let mut upcoming = test_support::active_exam("future", now + Duration::hours(1), None, 30);
    harness
        .store
        .put_exam(upcoming.clone(), vec![test_support::choice_question("future", "f1", 0, 1)]);
    let err = harness.lifecycle.start_or_resume("future", "student-1").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    upcoming.status = crate::db::types::ExamStatus::Draft;
    upcoming.start_time = now - Duration::hours(1);
    harness.store.put_exam(upcoming, vec![test_support::choice_question("future", "f1", 0, 1)]);
    let err = harness.lifecycle.start_or_resume("future", "student-1").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let err = harness.lifecycle.start_or_resume("missing", "student-1").await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound("exam")));
}

#[tokio::test]
async fn save_merges_answers_and_review_marks() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    let saved = harness
        .lifecycle
        .save_answers(
            &submission.id,
            &[patch("exam-1-q1", None, Some("b")), patch("unknown", Some("x"), None)],
            Some(&["exam-1-q2".to_string(), "nope".to_string(), "exam-1-q2".to_string()][..]),
        )
        .await
        .unwrap();
    assert_eq!(saved.answers.0.len(), 2);
    assert_eq!(saved.answers.0[0].response_option.as_deref(), Some("b"));
    assert_eq!(saved.marked_for_review.0, vec!["exam-1-q2".to_string()]);

    let saved = harness
        .lifecycle
        .save_answers(&submission.id, &[patch("exam-1-q2", Some("Partial text"), None)], None)
        .await
        .unwrap();
    assert_eq!(saved.answers.0[0].response_option.as_deref(), Some("b"));
    assert_eq!(saved.answers.0[1].response_text.as_deref(), Some("Partial text"));
    assert_eq!(saved.marked_for_review.0, vec!["exam-1-q2".to_string()]);
}

#[tokio::test]
async fn save_after_deadline_auto_finalizes() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 10).await;
    harness
        .lifecycle
        .save_answers(&submission.id, &[patch("exam-1-q1", None, Some("b"))], None)
        .await
        .unwrap();
    harness.store.rewind_start(&submission.id, Duration::minutes(11));

    let result = harness
        .lifecycle
        .save_answers(&submission.id, &[patch("exam-1-q1", None, Some("a"))], None)
        .await
        .unwrap();

    assert_eq!(result.status, SubmissionStatus::Evaluated);
    assert_eq!(result.submission_type, Some(SubmissionType::Auto));
    assert_eq!(result.evaluations.0.len(), result.answers.0.len());
    assert_eq!(result.answers.0[0].response_option.as_deref(), Some("b"));
    assert_eq!(result.total_marks, 2);
    assert!(result.submitted_at.is_some());
    assert!(result.evaluated_at.is_some());
}

#[tokio::test]
async fn exam_end_bounds_the_deadline() {
    let harness = test_support::lifecycle_harness();
    let mut exam = test_support::seed_open_exam(&harness.store, "exam-1", 120);
    let submission = harness.lifecycle.start_or_resume("exam-1", "student-1").await.unwrap();

    exam.end_time = Some(primitive_now_utc() - Duration::seconds(1));
    harness.store.put_exam(
        exam,
        vec![
            test_support::choice_question("exam-1", "exam-1-q1", 0, 2),
            test_support::subjective_question("exam-1", "exam-1-q2", 1, 10),
        ],
    );

    let current = harness.lifecycle.get(&submission.id).await.unwrap();
    assert_eq!(current.status, SubmissionStatus::Evaluated);
    assert_eq!(current.submission_type, Some(SubmissionType::Auto));
}

#[tokio::test]
async fn resuming_an_expired_attempt_returns_it_finalized() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 10).await;
    harness.store.rewind_start(&submission.id, Duration::minutes(10));

    let resumed = harness.lifecycle.start_or_resume("exam-1", "student-1").await.unwrap();
    assert_eq!(resumed.id, submission.id);
    assert_eq!(resumed.status, SubmissionStatus::Evaluated);
}

#[tokio::test]
async fn manual_submit_merges_final_answers_and_evaluates() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    let result = harness
        .lifecycle
        .submit(
            &submission.id,
            SubmissionType::Manual,
            &[patch("exam-1-q1", None, Some("c")), patch("exam-1-q2", Some("   "), None)],
        )
        .await
        .unwrap();

    assert_eq!(result.status, SubmissionStatus::Evaluated);
    assert_eq!(result.submission_type, Some(SubmissionType::Manual));
    assert_eq!(result.answers.0[0].response_option.as_deref(), Some("c"));
    assert_eq!(result.evaluations.0[0].marks, 0);
    assert_eq!(
        result.evaluations.0[1].meta,
        EvaluationMeta::Automatic { tag: AutomaticTag::EmptyAnswer }
    );
    assert_eq!(result.total_marks, 0);
}

#[tokio::test]
async fn submit_is_idempotent_and_scores_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "{\"score\": 70, \"review\": \"Reasonable.\"}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher =
        test_support::dispatcher_with(&test_support::scoring_settings(&server.uri(), "key"));
    let harness = test_support::lifecycle_harness_with(dispatcher);
    let submission = started(&harness, 30).await;
    let answers = [patch("exam-1-q2", Some("Water moves toward the salt."), None)];

    let first =
        harness.lifecycle.submit(&submission.id, SubmissionType::Manual, &answers).await.unwrap();
    let second =
        harness.lifecycle.submit(&submission.id, SubmissionType::Manual, &answers).await.unwrap();

    assert_eq!(first.status, SubmissionStatus::Evaluated);
    assert_eq!(first.evaluations.0, second.evaluations.0);
    assert_eq!(first.evaluated_at, second.evaluated_at);
    assert_eq!(first.total_marks, 7);
    assert_eq!(first.evaluations.0[1].evaluator, EvaluatorKind::DelegatedAi);
}

#[tokio::test]
async fn racing_submits_transition_once() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    let (a, b) = tokio::join!(
        harness.lifecycle.submit(&submission.id, SubmissionType::Manual, &[]),
        harness.lifecycle.submit(&submission.id, SubmissionType::Auto, &[]),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.submitted_at, b.submitted_at);
    assert_eq!(a.submission_type, b.submission_type);
    assert_eq!(a.evaluations.0, b.evaluations.0);
}

#[tokio::test]
async fn save_after_submit_is_rejected() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;
    harness.lifecycle.submit(&submission.id, SubmissionType::Manual, &[]).await.unwrap();

    let err = harness
        .lifecycle
        .save_answers(&submission.id, &[patch("exam-1-q1", None, Some("b"))], None)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));
}

#[tokio::test]
async fn sixth_violation_forces_submission() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    for expected in 1..=5 {
        let report = harness.lifecycle.report_violation(&submission.id, "tab-switch").await;
        assert_eq!(report.violation_count, expected);
        let current = report.submission.expect("submission");
        assert_eq!(current.status, SubmissionStatus::InProgress);
    }

    let report = harness.lifecycle.report_violation(&submission.id, "tab-switch").await;
    assert_eq!(report.violation_count, 6);
    let current = report.submission.expect("submission");
    assert_ne!(current.status, SubmissionStatus::InProgress);
    assert_eq!(current.submission_type, Some(SubmissionType::Auto));
}

#[tokio::test]
async fn violations_keep_counting_after_finalize() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;
    harness.lifecycle.submit(&submission.id, SubmissionType::Manual, &[]).await.unwrap();

    let report = harness.lifecycle.report_violation(&submission.id, "copy").await;
    assert_eq!(report.violation_count, 1);
    let current = report.submission.expect("submission");
    assert_eq!(current.submission_type, Some(SubmissionType::Manual));
}

#[tokio::test]
async fn violation_for_unknown_submission_is_silent() {
    let harness = test_support::lifecycle_harness();
    let report = harness.lifecycle.report_violation("nope", "tab-switch").await;
    assert_eq!(report.violation_count, 0);
    assert!(report.submission.is_none());
}

#[tokio::test]
async fn publish_requires_evaluation_and_is_idempotent() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    let err = harness.lifecycle.publish(&submission.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    harness
        .store
        .mark_submitted(&submission.id, SubmissionType::Manual, None, primitive_now_utc())
        .await
        .unwrap()
        .expect("submitted");
    let err = harness.lifecycle.publish(&submission.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    let published = harness.lifecycle.publish(&submission.id).await.unwrap();
    assert_eq!(published.status, SubmissionStatus::Published);
    assert!(published.published_at.is_some());

    let again = harness.lifecycle.publish(&submission.id).await.unwrap();
    assert_eq!(again.published_at, published.published_at);
}

#[tokio::test]
async fn publish_all_only_touches_evaluated_attempts() {
    let harness = test_support::lifecycle_harness();
    let first = started(&harness, 30).await;
    harness.lifecycle.start_or_resume("exam-1", "student-2").await.unwrap();
    harness.lifecycle.submit(&first.id, SubmissionType::Manual, &[]).await.unwrap();

    assert_eq!(harness.lifecycle.publish_all_evaluated("exam-1").await.unwrap(), 1);
    assert_eq!(harness.lifecycle.publish_all_evaluated("exam-1").await.unwrap(), 0);
    assert!(matches!(
        harness.lifecycle.publish_all_evaluated("missing").await,
        Err(LifecycleError::NotFound("exam"))
    ));
}

#[tokio::test]
async fn teacher_override_replaces_marks_and_keeps_status() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    let err = harness
        .lifecycle
        .apply_teacher_override(
            &submission.id,
            "teacher-1",
            &[TeacherOverride { question_id: "exam-1-q2".to_string(), marks: 5, remarks: None }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)));

    harness
        .lifecycle
        .submit(&submission.id, SubmissionType::Manual, &[patch("exam-1-q1", None, Some("b"))])
        .await
        .unwrap();

    let too_high =
        TeacherOverride { question_id: "exam-1-q2".to_string(), marks: 11, remarks: None };
    let err = harness
        .lifecycle
        .apply_teacher_override(&submission.id, "teacher-1", &[too_high])
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let foreign = TeacherOverride { question_id: "other".to_string(), marks: 1, remarks: None };
    let err = harness
        .lifecycle
        .apply_teacher_override(&submission.id, "teacher-1", &[foreign])
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let updated = harness
        .lifecycle
        .apply_teacher_override(
            &submission.id,
            "teacher-1",
            &[TeacherOverride {
                question_id: "exam-1-q2".to_string(),
                marks: 8,
                remarks: Some("Good reasoning.".to_string()),
            }],
        )
        .await
        .unwrap();

    assert_eq!(updated.status, SubmissionStatus::Evaluated);
    assert_eq!(updated.total_marks, 10);
    let overridden = &updated.evaluations.0[1];
    assert_eq!(overridden.evaluator, EvaluatorKind::Teacher);
    assert_eq!(overridden.remarks, "Good reasoning.");
    assert_eq!(
        overridden.meta,
        EvaluationMeta::TeacherOverride {
            overridden_by: "teacher-1".to_string(),
            previous_marks: 0,
            previous_evaluator: EvaluatorKind::Automatic,
        }
    );
}

#[tokio::test]
async fn listing_settles_expired_attempts() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 10).await;
    harness.store.rewind_start(&submission.id, Duration::minutes(30));

    let listed = harness.lifecycle.list_for_student("student-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, SubmissionStatus::Evaluated);
}

#[tokio::test]
async fn listing_survives_an_attempt_that_cannot_be_evaluated() {
    let harness = test_support::lifecycle_harness();
    let healthy = started(&harness, 30).await;
    harness.lifecycle.submit(&healthy.id, SubmissionType::Manual, &[]).await.unwrap();

    let opened = primitive_now_utc() - Duration::hours(1);
    let broken_exam = test_support::active_exam("exam-2", opened, None, 10);
    harness.store.put_exam(
        broken_exam.clone(),
        vec![test_support::subjective_question("exam-2", "x1", 0, 5)],
    );
    let broken = harness.lifecycle.start_or_resume("exam-2", "student-1").await.unwrap();

    let mut blank = test_support::subjective_question("exam-2", "x1", 0, 5);
    blank.text = String::new();
    harness.store.put_exam(broken_exam, vec![blank]);
    harness.store.rewind_start(&broken.id, Duration::minutes(30));

    let listed = harness.lifecycle.list_for_student("student-1").await.unwrap();
    assert_eq!(listed.len(), 2);
    let status_of = |id: &str| listed.iter().find(|item| item.id == id).map(|item| item.status);
    assert_eq!(status_of(&healthy.id), Some(SubmissionStatus::Evaluated));
    assert_eq!(status_of(&broken.id), Some(SubmissionStatus::Submitted));

    let err = harness.lifecycle.get(&broken.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Internal(_)));
}

#[tokio::test]
async fn duplicate_overrides_in_one_batch_are_rejected() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;
    harness.lifecycle.submit(&submission.id, SubmissionType::Manual, &[]).await.unwrap();

    let item = |marks: i32| TeacherOverride {
        question_id: "exam-1-q2".to_string(),
        marks,
        remarks: None,
    };
    let err = harness
        .lifecycle
        .apply_teacher_override(&submission.id, "teacher-1", &[item(4), item(6)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Validation(ref message) if message.contains("more than once")
    ));

    let stored = harness.lifecycle.get(&submission.id).await.unwrap();
    assert_eq!(stored.evaluations.0[1].evaluator, EvaluatorKind::Automatic);
    assert_eq!(stored.total_marks, 0);
}

#[tokio::test]
async fn owner_check_distinguishes_students() {
    let harness = test_support::lifecycle_harness();
    let submission = started(&harness, 30).await;

    assert!(harness.lifecycle.ensure_owner(&submission.id, "student-1").await.is_ok());
    assert!(matches!(
        harness.lifecycle.ensure_owner(&submission.id, "student-2").await,
        Err(LifecycleError::Forbidden)
    ));
    assert!(matches!(
        harness.lifecycle.ensure_owner("missing", "student-1").await,
        Err(LifecycleError::NotFound("submission"))
    ));
}
