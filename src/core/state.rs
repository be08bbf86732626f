use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::repositories::Repositories;
use crate::services::submission_lifecycle::SubmissionLifecycle;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: Option<PgPool>,
    repositories: Repositories,
    lifecycle: SubmissionLifecycle,
}

impl AppState {
    /// `db` is `None` when the in-memory backend is selected.
    pub(crate) fn new(
        settings: Settings,
        db: Option<PgPool>,
        repositories: Repositories,
        lifecycle: SubmissionLifecycle,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, repositories, lifecycle }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }

    pub(crate) fn repositories(&self) -> &Repositories {
        &self.inner.repositories
    }

    pub(crate) fn lifecycle(&self) -> &SubmissionLifecycle {
        &self.inner.lifecycle
    }
}
