use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process mutual exclusion keyed by document id.
///
/// Entries are weak so an idle key costs nothing once its last guard drops.
/// Cross-process safety still relies on the conditional updates in the
/// repositories; this only keeps one process from racing itself.
#[derive(Clone, Default)]
pub(crate) struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Weak<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    entries.retain(|_, entry| entry.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    entries.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
