//! Per-session turn serialisation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// One async mutex per session id.
///
/// A turn holds the guard from load to save, so turns on the same id run one
/// after another while turns on different ids proceed independently. An id's
/// entry is dropped once no turn holds or waits on it.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: LockMap,
}

/// Exclusive access to one session id, released on drop.
#[derive(Debug)]
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: String,
    locks: LockMap,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        SessionGuard {
            guard: Some(lock.lock_owned().await),
            id: id.to_string(),
            locks: Arc::clone(&self.locks),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters hold a clone of the entry, so a count of one means only the map is left.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}
