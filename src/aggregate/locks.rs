use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::MetricsKey;

/// One async mutex per key, created on demand and reclaimed when idle.
///
/// Waiters clone the entry's `Arc` while holding the map lock, so an entry
/// whose count is 2 (map + releasing guard) under that lock has no waiters.
#[derive(Default)]
pub struct KeyedLocks {
    entries: Mutex<HashMap<MetricsKey, Arc<AsyncMutex<()>>>>,
}

pub struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: MetricsKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &MetricsKey) -> KeyGuard<'_> {
        let slot = self.entries.lock().entry(key.clone()).or_default().clone();
        let guard = slot.lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Keys currently holding an entry (held or awaited).
    pub fn active(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut entries = self.owner.entries.lock();
        if let Some(slot) = entries.get(&self.key) {
            if Arc::strong_count(slot) == 2 {
                entries.remove(&self.key);
            }
        }
        // Release only after the map decision so no waiter slips in between
        self.guard.take();
    }
}
