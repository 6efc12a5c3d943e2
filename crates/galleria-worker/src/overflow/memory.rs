use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{OverflowError, OverflowStore};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct OverflowState {
    pub values: HashMap<String, String>,
    pub lists: HashMap<String, Vec<String>>,
}

impl OverflowState {
    pub fn compare_and_swap(&mut self, list: &str, expected: &[String], new: Vec<String>) -> bool {
        let current = self.lists.get(list).map(Vec::as_slice).unwrap_or(&[]);
        if current != expected {
            return false;
        }
        if new.is_empty() {
            self.lists.remove(list);
        } else {
            self.lists.insert(list.to_string(), new);
        }
        true
    }
}

/// Non-durable overflow store for tests and single-process runs.
#[derive(Clone, Default)]
pub struct MemoryOverflowStore {
    state: Arc<Mutex<OverflowState>>,
    forced_cas_failures: Arc<AtomicU32>,
}

impl MemoryOverflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OverflowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` compare-and-swap calls lose, as if another worker won.
    pub fn fail_next_swaps(&self, n: u32) {
        self.forced_cas_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl OverflowStore for MemoryOverflowStore {
    async fn get(&self, key: &str) -> Result<Option<String>, OverflowError> {
        Ok(self.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), OverflowError> {
        self.lock().values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, OverflowError> {
        Ok(self.lock().values.remove(key).is_some())
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, OverflowError> {
        Ok(self.lock().lists.get(list).cloned().unwrap_or_default())
    }

    async fn compare_and_swap_list(
        &self,
        list: &str,
        expected: &[String],
        new: Vec<String>,
    ) -> Result<bool, OverflowError> {
        let forced = self
            .forced_cas_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Ok(false);
        }
        Ok(self.lock().compare_and_swap(list, expected, new))
    }
}
