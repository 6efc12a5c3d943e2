use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Per-process LRU tier. Entries also expire after `ttl` so a peer's
/// invalidation is observed within a bounded time even without a delete here.
pub struct LocalTier {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl LocalTier {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn put(&self, key: &str, value: Vec<u8>) {
        self.lock().put(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().pop(key).is_some()
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let tier = LocalTier::new(2, Duration::from_secs(60));
        tier.put("a", b"1".to_vec());
        tier.put("b", b"2".to_vec());
        assert!(tier.get("a").is_some());
        tier.put("c", b"3".to_vec());
        assert!(tier.get("b").is_none());
        assert_eq!(tier.get("a").unwrap(), b"1");
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let tier = LocalTier::new(4, Duration::ZERO);
        tier.put("a", b"1".to_vec());
        assert!(tier.get("a").is_none());
        assert!(tier.is_empty());
    }

    #[test]
    fn test_remove_prefix() {
        let tier = LocalTier::new(8, Duration::from_secs(60));
        tier.put("list:1", vec![]);
        tier.put("list:2", vec![]);
        tier.put("detail:1", vec![]);
        assert_eq!(tier.remove_prefix("list:"), 2);
        assert_eq!(tier.len(), 1);
    }
}
