pub(crate) mod exams;
pub(crate) mod memory;
pub(crate) mod submissions;

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

pub(crate) use exams::{ExamRepository, PgExamRepository};
pub(crate) use memory::MemoryStore;
pub(crate) use submissions::{PgSubmissionRepository, SubmissionRepository};

#[derive(Debug, Error)]
pub(crate) enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) type RepoResult<T> = Result<T, RepositoryError>;

/// The persistence ports the core depends on, bundled so they can be swapped
/// as a unit between PostgreSQL and the in-memory store.
#[derive(Clone)]
pub(crate) struct Repositories {
    pub(crate) exams: Arc<dyn ExamRepository>,
    pub(crate) submissions: Arc<dyn SubmissionRepository>,
}

impl Repositories {
    pub(crate) fn postgres(pool: PgPool) -> Self {
        Self {
            exams: Arc::new(PgExamRepository::new(pool.clone())),
            submissions: Arc::new(PgSubmissionRepository::new(pool)),
        }
    }

    pub(crate) fn memory(store: Arc<MemoryStore>) -> Self {
        Self { exams: store.clone(), submissions: store }
    }
}
