pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{Settings, StorageBackend};
use crate::core::{state::AppState, telemetry};
use crate::repositories::{MemoryStore, Repositories};
use crate::services::evaluation::EvaluationDispatcher;
use crate::services::scoring::ScoringClient;
use crate::services::submission_lifecycle::SubmissionLifecycle;

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let (db, repositories) = match settings.database().backend {
        StorageBackend::Postgres => {
            let pool = db::init_pool(&settings).await?;
            db::run_migrations(&pool).await?;
            let repositories = Repositories::postgres(pool.clone());
            (Some(pool), repositories)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            (None, Repositories::memory(Arc::new(MemoryStore::new())))
        }
    };

    if !settings.scoring().is_configured() {
        tracing::warn!("Scoring service not configured; open answers use heuristic scoring");
    }
    let scoring = ScoringClient::from_settings(settings.scoring())?;
    let lifecycle =
        SubmissionLifecycle::new(repositories.clone(), EvaluationDispatcher::new(scoring));

    Ok(AppState::new(settings, db, repositories, lifecycle))
}

fn load_settings() -> anyhow::Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;
    Ok(settings)
}

pub async fn run() -> anyhow::Result<()> {
    let settings = load_settings()?;
    let state = build_state(settings).await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Examflow API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    if let Some(pool) = state.db() {
        pool.close().await;
    }
    tracing::info!("Examflow API stopped");

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let settings = load_settings()?;
    let state = build_state(settings).await?;

    let result = tasks::scheduler::run(state.clone()).await;

    if let Some(pool) = state.db() {
        pool.close().await;
    }

    result
}
