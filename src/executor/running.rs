//! Registry of in-flight executions, keyed by source.
//!
//! Pure bookkeeping, separated from the dispatcher so the single-flight rules
//! can be tested without a worker.

use super::RequestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Cancellation handle of one in-flight execution.
#[derive(Debug, Clone)]
pub struct RunningTask {
    pub request_id: RequestId,
    pub cancel: CancellationToken,
}

impl RunningTask {
    pub fn new(request_id: RequestId, cancel: CancellationToken) -> Self {
        Self { request_id, cancel }
    }

    /// Requests cooperative cancellation. Returns false if already requested.
    pub fn cancel(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

/// Shared map from source key to the task running on its behalf.
#[derive(Debug, Clone, Default)]
pub struct RunningTasks {
    inner: Arc<Mutex<HashMap<String, RunningTask>>>,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RunningTask>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `task` for `key`, returning the task it replaces.
    pub fn insert(&self, key: &str, task: RunningTask) -> Option<RunningTask> {
        self.lock().insert(key.to_string(), task)
    }

    /// Removes whatever runs for `key`.
    pub fn remove(&self, key: &str) -> Option<RunningTask> {
        self.lock().remove(key)
    }

    /// Removes the entry for `key` only if it belongs to `request_id`.
    ///
    /// A finishing execution must not evict a newer one submitted under the same key.
    pub fn release(&self, key: &str, request_id: RequestId) -> bool {
        let mut map = self.lock();
        match map.get(key) {
            Some(task) if task.request_id == request_id => {
                map.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Removes and returns every entry.
    pub fn drain(&self) -> Vec<RunningTask> {
        self.lock().drain().map(|(_, task)| task).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn get(&self, key: &str) -> Option<RunningTask> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
