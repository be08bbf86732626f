use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry: one initial attempt plus `max_retries` more.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) delay: Duration,
}

#[derive(Debug)]
pub(crate) struct RetryOutcome<T, E> {
    pub(crate) result: Result<T, E>,
    pub(crate) attempts: u32,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Runs `operation` with the 1-based attempt number until it succeeds or
    /// attempts run out. The last error is returned.
    pub(crate) async fn run<T, E, F, Fut>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let total = self.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return RetryOutcome { result: Ok(value), attempts: attempt },
                Err(err) if attempt < total => {
                    tracing::warn!(
                        attempt,
                        max_attempts = total,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return RetryOutcome { result: Err(err), attempts: attempt },
            }
        }
    }
}
