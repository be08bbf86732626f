use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::config::{ScoringSettings, Settings};
use crate::core::security::{self, Role};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{EvaluationPolicy, Exam, Question, QuestionOption};
use crate::db::types::{ExamStatus, QuestionType};
use crate::repositories::{MemoryStore, Repositories};
use crate::services::evaluation::EvaluationDispatcher;
use crate::services::scoring::ScoringClient;
use crate::services::submission_lifecycle::SubmissionLifecycle;

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<MemoryStore>,
    _guard: OwnedMutexGuard<()>,
}

/// State machine wired to a fresh in-memory store.
pub(crate) struct LifecycleHarness {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) lifecycle: SubmissionLifecycle,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAMFLOW_ENV", "test");
    std::env::set_var("EXAMFLOW_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("ALGORITHM", "HS256");
    std::env::set_var("STORAGE_BACKEND", "memory");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("SCORING_API_KEY");
    std::env::remove_var("SCORING_BASE_URL");
    std::env::remove_var("SCORING_MAX_RETRIES");
    std::env::remove_var("SCHEDULER_TICK_SECONDS");
    std::env::remove_var("DATABASE_URL");
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let store = Arc::new(MemoryStore::new());
    let repositories = Repositories::memory(store.clone());
    let lifecycle = SubmissionLifecycle::new(repositories.clone(), offline_dispatcher());
    let state = AppState::new(settings, None, repositories, lifecycle);
    let app = api::router::router(state.clone());

    TestContext { state, app, store, _guard: guard }
}

pub(crate) fn scoring_settings(base_url: &str, api_key: &str) -> ScoringSettings {
    ScoringSettings {
        api_key: api_key.to_string(),
        base_url: base_url.to_string(),
        model: "test-model".to_string(),
        max_tokens: 256,
        temperature: 0.0,
        timeout_seconds: 5,
        max_retries: 2,
        retry_delay_ms: 0,
        answer_char_limit: 6000,
    }
}

/// Dispatcher whose scorer is unconfigured, so open answers take the heuristic path.
pub(crate) fn offline_dispatcher() -> EvaluationDispatcher {
    dispatcher_with(&scoring_settings("", ""))
}

pub(crate) fn dispatcher_with(settings: &ScoringSettings) -> EvaluationDispatcher {
    EvaluationDispatcher::new(ScoringClient::from_settings(settings).expect("scoring client"))
}

pub(crate) fn lifecycle_harness() -> LifecycleHarness {
    lifecycle_harness_with(offline_dispatcher())
}

pub(crate) fn lifecycle_harness_with(dispatcher: EvaluationDispatcher) -> LifecycleHarness {
    let store = Arc::new(MemoryStore::new());
    let lifecycle = SubmissionLifecycle::new(Repositories::memory(store.clone()), dispatcher);
    LifecycleHarness { store, lifecycle }
}

pub(crate) fn active_exam(
    id: &str,
    start_time: PrimitiveDateTime,
    end_time: Option<PrimitiveDateTime>,
    duration_minutes: i32,
) -> Exam {
    Exam {
        id: id.to_string(),
        title: format!("Exam {id}"),
        start_time,
        end_time,
        duration_minutes,
        status: ExamStatus::Active,
        policy: Json(EvaluationPolicy::default()),
        created_by: "teacher-1".to_string(),
        created_at: start_time,
        updated_at: start_time,
    }
}

/// Options `a`, `b`, `c`; only `b` is correct.
pub(crate) fn choice_question(
    exam_id: &str,
    id: &str,
    order_index: i32,
    max_marks: i32,
) -> Question {
    let option = |option_id: &str, is_correct: bool| QuestionOption {
        id: option_id.to_string(),
        text: format!("Option {option_id}"),
        is_correct,
    };
    Question {
        id: id.to_string(),
        exam_id: exam_id.to_string(),
        order_index,
        text: format!("Choice question {id}"),
        question_type: QuestionType::MultipleChoice,
        max_marks,
        options: Json(vec![option("a", false), option("b", true), option("c", false)]),
        reference_answer: None,
        policy: Json(EvaluationPolicy::default()),
    }
}

pub(crate) fn subjective_question(
    exam_id: &str,
    id: &str,
    order_index: i32,
    max_marks: i32,
) -> Question {
    Question {
        id: id.to_string(),
        exam_id: exam_id.to_string(),
        order_index,
        text: format!("Explain the concept behind question {id}."),
        question_type: QuestionType::Subjective,
        max_marks,
        options: Json(Vec::new()),
        reference_answer: Some("A concise reference explanation.".to_string()),
        policy: Json(EvaluationPolicy::default()),
    }
}

/// Active exam that opened an hour ago with one choice and one open question.
pub(crate) fn seed_open_exam(store: &MemoryStore, exam_id: &str, duration_minutes: i32) -> Exam {
    let opened = primitive_now_utc() - time::Duration::hours(1);
    let exam = active_exam(exam_id, opened, None, duration_minutes);
    store.put_exam(
        exam.clone(),
        vec![
            choice_question(exam_id, &format!("{exam_id}-q1"), 0, 2),
            subjective_question(exam_id, &format!("{exam_id}-q2"), 1, 10),
        ],
    );
    exam
}

pub(crate) fn bearer_token(user_id: &str, role: Role, settings: &Settings) -> String {
    security::create_access_token(user_id, role, settings, time::Duration::hours(1)).expect("token")
}

/// Validly signed token whose claims carry no `role`.
pub(crate) fn token_without_role(user_id: &str, settings: &Settings) -> String {
    let exp = (time::OffsetDateTime::now_utc() + time::Duration::hours(1)).unix_timestamp();
    security::sign_claims(&serde_json::json!({"sub": user_id, "exp": exp}), settings)
        .expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
