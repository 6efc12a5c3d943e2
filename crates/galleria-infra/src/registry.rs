//! Keyed registries
//!
//! `Registry` is the register/unregister/lookup interface for process-wide
//! keyed state. `KeyedLocks` builds per-key async mutexes on top of it; the
//! ingestion coordinator uses them to serialize uploads of the same content and
//! to detect concurrent edits of the same picture.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};

pub trait Registry<K, V>: Send + Sync {
    /// Insert or replace; returns the previous value.
    fn register(&self, key: K, value: V) -> Option<V>;

    fn unregister(&self, key: &K) -> Option<V>;

    fn lookup(&self, key: &K) -> Option<V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry backed by a `HashMap` behind a std `RwLock`. No lock is ever held
/// across an await point.
pub struct InMemoryRegistry<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryRegistry<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the registered value, registering `make()` first if absent.
    pub fn get_or_register(&self, key: K, make: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        self.write().entry(key).or_insert_with(make).clone()
    }

    /// Remove the entry only when `predicate` holds, atomically with the check.
    pub fn unregister_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut entries = self.write();
        match entries.get(key) {
            Some(value) if predicate(value) => entries.remove(key),
            _ => None,
        }
    }
}

impl<K, V> Default for InMemoryRegistry<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Registry<K, V> for InMemoryRegistry<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn register(&self, key: K, value: V) -> Option<V> {
        self.write().insert(key, value)
    }

    fn unregister(&self, key: &K) -> Option<V> {
        self.write().remove(key)
    }

    fn lookup(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.read().len()
    }
}

type LockRegistry<K> = InMemoryRegistry<K, Arc<Mutex<()>>>;

/// Per-key async mutexes. Entries exist only while someone holds or waits for
/// the key.
pub struct KeyedLocks<K> {
    name: &'static str,
    registry: Arc<LockRegistry<K>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Display + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(InMemoryRegistry::new()),
        }
    }

    /// Wait for exclusive ownership of `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = self
            .registry
            .get_or_register(key.clone(), || Arc::new(Mutex::new(())));
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key,
            guard: Some(guard),
            registry: self.registry.clone(),
        }
    }

    /// Take `key` only if nobody holds it.
    pub fn try_lock(&self, key: K) -> Option<KeyedGuard<K>> {
        let mutex = self
            .registry
            .get_or_register(key.clone(), || Arc::new(Mutex::new(())));
        match mutex.try_lock_owned() {
            Ok(guard) => Some(KeyedGuard {
                key,
                guard: Some(guard),
                registry: self.registry.clone(),
            }),
            Err(_) => {
                tracing::debug!(registry = self.name, key = %key, "Key is already locked");
                release_entry(&self.registry, &key);
                None
            }
        }
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.registry.lookup(key).is_some()
    }

    pub fn active(&self) -> usize {
        self.registry.len()
    }
}

/// Drop the registry entry when its only remaining reference is the registry's.
fn release_entry<K: Eq + Hash>(registry: &LockRegistry<K>, key: &K) {
    registry.unregister_if(key, |mutex| Arc::strong_count(mutex) == 1);
}

pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<LockRegistry<K>>,
}

impl<K: Eq + Hash> KeyedGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_entry(&self.registry, &self.key);
    }
}
