use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes addressed by string key, created on first use.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // clone the Arc out so the shard lock is released before awaiting
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Locks several keys in sorted order so overlapping multi-key writers can't deadlock.
    pub(crate) async fn lock_all(&self, keys: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(&key).await);
        }
        guards
    }

    /// Drops mutexes nobody holds or waits on.
    pub(crate) fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Lock key for one chunk of one main world.
pub(crate) fn chunk_lock_key(main_world_id: &str, chunk_key: &str) -> String {
    format!("{main_world_id}/{chunk_key}")
}
