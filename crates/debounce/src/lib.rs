//! Keyed cancellable delays.
//!
//! One pending timer per key: scheduling again within the window cancels
//! the previous timer and re-arms it (debounce, not throttle). Keys are
//! forgotten once their task runs or is cancelled, so a dropped tab leaves
//! no timer behind.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

struct Pending {
    seq: u64,
    handle: JoinHandle<()>,
}

pub struct DebounceMap<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pending: Arc<DashMap<K, Pending>>,
    seq: AtomicU64,
}

impl<K> DebounceMap<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Arm (or re-arm) the timer for `key`. After `delay` elapses without
    /// another call for the same key, `task` runs once.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Only the newest timer for a key may fire; a concurrent
            // re-schedule supersedes this one even if the abort raced.
            if pending
                .remove_if(&task_key, |_, entry| entry.seq == seq)
                .is_some()
            {
                task.await;
            }
        });

        if let Some(previous) = self.pending.insert(key, Pending { seq, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the pending timer for `key`, if any.
    pub fn cancel(&self, key: &K) {
        if let Some((_, entry)) = self.pending.remove(key) {
            entry.handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let keys: Vec<K> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }
}

impl<K> Default for DebounceMap<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for DebounceMap<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cancel_all();
    }
}
