//! Per-thread mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::turn::ThreadId;

/// Exclusive access to one thread for the duration of a load-then-append.
///
/// Dropping the lease releases the thread.
#[derive(Debug)]
pub struct ThreadLease {
    thread_id: ThreadId,
    _guard: OwnedMutexGuard<()>,
}

impl ThreadLease {
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }
}

/// Registry of per-thread locks.
///
/// Leases on different threads never contend; leases on the same thread
/// are granted in FIFO order.
#[derive(Debug, Default, Clone)]
pub struct ThreadLocks {
    locks: Arc<Mutex<HashMap<ThreadId, Arc<AsyncMutex<()>>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `thread_id`.
    pub async fn acquire(&self, thread_id: &ThreadId) -> ThreadLease {
        let lock = self.lock_for(thread_id);
        let guard = lock.lock_owned().await;
        ThreadLease {
            thread_id: thread_id.clone(),
            _guard: guard,
        }
    }

    fn lock_for(&self, thread_id: &ThreadId) -> Arc<AsyncMutex<()>> {
        // A poisoned registry still holds valid locks.
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop entries nobody holds or waits on so the map tracks live threads only.
        locks.retain(|id, lock| id == thread_id || Arc::strong_count(lock) > 1);
        locks.entry(thread_id.clone()).or_default().clone()
    }

    /// Number of threads with a lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_else(|e| e.into_inner().len())
    }
}
