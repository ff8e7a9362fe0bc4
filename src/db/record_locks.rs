use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-monitor mutation locks.
///
/// Anything that writes `state` for a monitor (toggle, delete, and the
/// evaluation cycle applying a probe outcome) holds the monitor's lock for
/// the duration of its read-decide-write sequence.
#[derive(Default)]
pub struct RecordLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: i64) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(id).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drops the lock entry of a deleted monitor unless someone still holds
    /// or waits on it.
    pub fn release(&self, id: i64) {
        self.locks
            .remove_if(&id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
