use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::shutdown::watch_shutdown;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::tasks::maintenance;

/// Runs the exam status sweeps until SIGINT/SIGTERM.
pub(crate) async fn run(state: AppState) -> Result<()> {
    run_until(state, watch_shutdown()).await;
    Ok(())
}

pub(crate) async fn run_until(state: AppState, shutdown: watch::Receiver<bool>) {
    let scheduler = state.settings().scheduler();
    tracing::info!(
        tick_seconds = scheduler.tick_seconds,
        draft_purge_interval_seconds = scheduler.draft_purge_interval_seconds,
        "Status scheduler started"
    );

    let handles = vec![
        tokio::spawn(complete_ended_loop(state.clone(), shutdown.clone())),
        tokio::spawn(purge_drafts_loop(state.clone(), shutdown)),
    ];

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }
    tracing::info!("Status scheduler stopped");
}

async fn complete_ended_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(state.settings().scheduler().tick_seconds.max(1)));
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let exams = state.repositories().exams.as_ref();
                let now = primitive_now_utc();
                if let Err(err) = maintenance::complete_ended_exams(exams, now).await {
                    tracing::error!(error = %err, "complete_ended_exams failed");
                }
            }
        }
    }
}

async fn purge_drafts_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let scheduler = state.settings().scheduler();
    let mut tick = interval(Duration::from_secs(scheduler.draft_purge_interval_seconds.max(1)));
    let max_age = time::Duration::hours(scheduler.draft_max_age_hours as i64);
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let exams = state.repositories().exams.as_ref();
                if let Err(err) =
                    maintenance::purge_stale_drafts(exams, primitive_now_utc(), max_age).await
                {
                    tracing::error!(error = %err, "purge_stale_drafts failed");
                }
            }
        }
    }
}
