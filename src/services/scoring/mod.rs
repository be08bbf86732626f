//! External text scoring with retry and a heuristic fallback.
//!
//! `ScoringClient::score` never fails: every error path resolves to a
//! heuristic mark tagged as a fallback in the evaluation metadata.

mod correlation;
mod heuristic;
mod prompt;
mod response;
mod retry;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

use crate::core::config::ScoringSettings;
use crate::db::models::{EvaluationMeta, EvaluationPolicy};

use response::ParseError;
use retry::RetryPolicy;

const MAX_REVIEW_SENTENCES: usize = 3;

/// Why one scoring attempt failed. Retried, logged, and recorded as the
/// fallback reason; never returned to callers.
#[derive(Debug, Error)]
pub(crate) enum ScoringError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scorer returned status {status}")]
    Status { status: u16 },
    #[error("unparseable reply: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub(crate) struct ScoreRequest<'a> {
    pub(crate) question_text: &'a str,
    pub(crate) answer: &'a str,
    pub(crate) reference_answer: Option<&'a str>,
    /// Marks per percentage point, `max_marks / 100`.
    pub(crate) weight: f64,
    pub(crate) max_marks: i32,
    pub(crate) policy: &'a EvaluationPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreOutcome {
    pub(crate) marks: i32,
    pub(crate) remarks: String,
    pub(crate) meta: EvaluationMeta,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoringClient {
    client: Client,
    settings: ScoringSettings,
    retry: RetryPolicy,
}

impl ScoringClient {
    pub(crate) fn from_settings(settings: &ScoringSettings) -> Result<Self> {
        let timeout_seconds = settings.timeout_seconds.max(1);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeout_seconds.min(10)))
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build scoring HTTP client")?;

        Ok(Self {
            client,
            settings: settings.clone(),
            retry: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.retry_delay_ms),
            ),
        })
    }

    pub(crate) async fn score(&self, request: &ScoreRequest<'_>) -> ScoreOutcome {
        let correlation_id = correlation::next_id();
        let (answer, answer_truncated) =
            sanitize_answer(request.answer, self.settings.answer_char_limit);

        if !self.settings.is_configured() {
            metrics::counter!("scoring_requests_total", "outcome" => "unconfigured").increment(1);
            tracing::debug!(
                correlation_id = %correlation_id,
                "Scorer not configured, using heuristic"
            );
            let heuristic_score_100 = heuristic::score(&answer);
            return ScoreOutcome {
                marks: scale(heuristic_score_100, request.weight, request.max_marks),
                remarks: heuristic::remark(&answer),
                meta: EvaluationMeta::AiFallbackConfig {
                    correlation_id,
                    heuristic_score_100,
                    answer_truncated,
                },
            };
        }

        let user_prompt = prompt::build_user_prompt(
            request.question_text,
            &answer,
            request.reference_answer,
            request.policy,
        );
        let prompt_ref = user_prompt.as_str();
        let correlation_ref = correlation_id.as_str();
        let outcome = self
            .retry
            .run(move |attempt| self.request_once(prompt_ref, correlation_ref, attempt))
            .await;

        match outcome.result {
            Ok(reply) => {
                metrics::counter!("scoring_requests_total", "outcome" => "success").increment(1);
                tracing::info!(
                    correlation_id = %correlation_id,
                    attempts = outcome.attempts,
                    score_100 = reply.score_100,
                    "Answer scored"
                );
                let review = response::truncate_sentences(&reply.review, MAX_REVIEW_SENTENCES);
                ScoreOutcome {
                    marks: scale(reply.score_100, request.weight, request.max_marks),
                    remarks: if review.is_empty() {
                        "Scored automatically.".to_string()
                    } else {
                        review
                    },
                    meta: EvaluationMeta::AiSuccess {
                        correlation_id,
                        score_100: reply.score_100,
                        attempts: outcome.attempts,
                        model: self.settings.model.clone(),
                        answer_truncated,
                    },
                }
            }
            Err(err) => {
                metrics::counter!("scoring_requests_total", "outcome" => "fallback").increment(1);
                tracing::error!(
                    correlation_id = %correlation_id,
                    attempts = outcome.attempts,
                    error = %err,
                    "Scoring failed, falling back to heuristic"
                );
                let heuristic_score_100 = heuristic::score(&answer);
                ScoreOutcome {
                    marks: scale(heuristic_score_100, request.weight, request.max_marks),
                    remarks: heuristic::remark(&answer),
                    meta: EvaluationMeta::AiFallbackError {
                        correlation_id,
                        reason: err.to_string(),
                        attempts: outcome.attempts,
                        heuristic_score_100,
                        answer_truncated,
                    },
                }
            }
        }
    }

    async fn request_once(
        &self,
        user_prompt: &str,
        correlation_id: &str,
        attempt: u32,
    ) -> Result<response::ScoredReply, ScoringError> {
        let payload = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": prompt::SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "response_format": {"type": "json_object"}
        });

        tracing::debug!(correlation_id, attempt, "Sending scoring request");

        let url = format!("{}/chat/completions", self.settings.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .header("x-correlation-id", correlation_id)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::Status { status: status.as_u16() });
        }

        let body = response.text().await?;
        Ok(response::parse_reply(&body)?)
    }
}

/// Collapses whitespace runs and caps the length in characters.
pub(crate) fn sanitize_answer(answer: &str, limit: usize) -> (String, bool) {
    let collapsed = answer.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= limit {
        return (collapsed, false);
    }
    (collapsed.chars().take(limit).collect(), true)
}

fn scale(score_100: f64, weight: f64, max_marks: i32) -> i32 {
    let upper = max_marks.max(0);
    let scaled = (score_100.clamp(0.0, 100.0) * weight).round();
    if !scaled.is_finite() {
        return 0;
    }
    (scaled as i32).clamp(0, upper)
}
