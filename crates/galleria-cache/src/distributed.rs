use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::CacheError;

/// Shared cache visible to every process of the deployment.
#[async_trait::async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration)
        -> Result<(), CacheError>;

    /// Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

struct StoredValue {
    value: Vec<u8>,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// In-process stand-in for a shared cache server.
#[derive(Clone, Default)]
pub struct MemoryDistributedCache {
    values: Arc<Mutex<HashMap<String, StoredValue>>>,
    failing_deletes: Arc<AtomicU32>,
    delete_calls: Arc<AtomicU32>,
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` deletes fail with a backend error.
    pub fn fail_next_deletes(&self, n: u32) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|v| v.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut values = self.lock();
        match values.get(key) {
            Some(stored) if stored.is_live() => Ok(Some(stored.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.lock().insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CacheError::Backend(format!("delete of '{}' failed", key)));
        }
        Ok(self.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock().get(key).is_some_and(|v| v.is_live()))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.is_live())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
