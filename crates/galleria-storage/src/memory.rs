//! In-memory storage backend.

use crate::keys::validate_storage_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

/// Stores objects in a process-local map. Counts every `put` so callers can
/// assert how many physical writes a workflow performed.
#[derive(Clone)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    base_url: String,
    puts: Arc<AtomicUsize>,
    failing_puts: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_base_url("memory://pictures")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            base_url: base_url.into(),
            puts: Arc::new(AtomicUsize::new(0)),
            failing_puts: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, storage_key: &str) -> Option<String> {
        self.objects()
            .get(storage_key)
            .map(|object| object.content_type.clone())
    }

    /// Make the next `count` uploads fail with `UploadFailed`.
    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        validate_storage_key(storage_key)?;
        if self.take_injected_failure() {
            return Err(StorageError::UploadFailed(format!(
                "Injected failure for {}",
                storage_key
            )));
        }

        let size = data.len();
        self.objects().insert(
            storage_key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(key = %storage_key, size_bytes = size, "Memory storage put");
        Ok(self.public_url(storage_key))
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Bytes> {
        self.objects()
            .get(storage_key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.objects().remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        Ok(self.objects().contains_key(storage_key))
    }

    async fn presigned_url(
        &self,
        storage_key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        if !self.objects().contains_key(storage_key) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }
        Ok(format!(
            "{}?expires_in={}",
            self.public_url(storage_key),
            expires_in.as_secs()
        ))
    }

    fn public_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
