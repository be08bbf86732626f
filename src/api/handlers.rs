use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let settings = state.settings();
    Json(RootResponse {
        message: settings.api().project_name.clone(),
        version: settings.api().version.clone(),
        environment: settings.runtime().environment.as_str().to_string(),
    })
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    match state.db() {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                components.insert("database".to_string(), "healthy".to_string());
            }
            Err(err) => {
                components.insert("database".to_string(), format!("unhealthy: {err}"));
                status = "unhealthy".to_string();
            }
        },
        None => {
            components.insert("database".to_string(), "in-memory".to_string());
        }
    }

    let scoring =
        if state.settings().scoring().is_configured() { "configured" } else { "heuristic-only" };
    components.insert("scoring".to_string(), scoring.to_string());

    Json(HealthResponse { service: "examflow-api".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
