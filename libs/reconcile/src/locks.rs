//! Per-key serialization of reconciler operations.
//!
//! Steps for a single state record must never interleave. Reconcilers that
//! share a store should share one [`KeyedLocks`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use warden_id::StateKey;

/// Exclusive access to one key. Owned, so it can move into a spawned task.
pub type KeyGuard = OwnedMutexGuard<()>;

/// A table of async mutexes keyed by state key.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    table: Arc<Mutex<HashMap<StateKey, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Access ends when the guard drops.
    pub async fn lock(&self, key: &StateKey) -> KeyGuard {
        let entry = {
            let mut table = self.table.lock().await;
            // Drop entries nobody holds or waits on.
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        entry.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub async fn active(&self) -> usize {
        self.table
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
