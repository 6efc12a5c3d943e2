//! Read-through cache layer
//!
//! Reads go local tier, then distributed tier, then origin. Writes happen on
//! the way back. Invalidation is a delayed double delete: both tiers are
//! cleared immediately, then the distributed entry is deleted again after
//! `double_delete_delay` so a reader that raced the writer cannot leave a
//! stale value behind.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use galleria_core::{AppError, CacheConfig};
use galleria_infra::pool::WorkerPool;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::distributed::DistributedCache;
use crate::error::CacheError;
use crate::local::LocalTier;

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub local_capacity: usize,
    pub local_ttl: Duration,
    pub ttl: Duration,
    pub ttl_jitter: Duration,
    pub double_delete_delay: Duration,
    pub double_delete_retries: u32,
    pub double_delete_retry_wait: Duration,
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            local_capacity: config.local_capacity,
            local_ttl: Duration::from_secs(config.local_ttl_secs),
            ttl: Duration::from_secs(config.ttl_secs),
            ttl_jitter: Duration::from_secs(config.ttl_jitter_secs),
            double_delete_delay: Duration::from_millis(config.double_delete_delay_ms),
            double_delete_retries: config.double_delete_retries,
            double_delete_retry_wait: Duration::from_millis(config.double_delete_retry_wait_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Key(String),
    Prefix(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Key(key) => write!(f, "{}", key),
            Target::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// Outcome of the delayed half of an invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub target: String,
    /// Delayed delete attempts made.
    pub attempts: u32,
    /// The target was confirmed absent from the distributed tier.
    pub cleared: bool,
}

/// Handle on the delayed delete. Dropping it detaches the work.
pub struct InvalidationHandle {
    target: String,
    handle: Option<JoinHandle<InvalidationReport>>,
}

impl InvalidationHandle {
    fn detached(target: String) -> Self {
        Self {
            target,
            handle: None,
        }
    }

    pub async fn wait(self) -> InvalidationReport {
        match self.handle {
            Some(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(target_key = %self.target, error = %e, "Delayed cache delete task failed");
                    InvalidationReport {
                        target: self.target,
                        attempts: 0,
                        cleared: false,
                    }
                }
            },
            None => InvalidationReport {
                target: self.target,
                attempts: 0,
                cleared: false,
            },
        }
    }
}

#[derive(Clone)]
pub struct CacheLayer {
    local: Arc<LocalTier>,
    distributed: Arc<dyn DistributedCache>,
    pool: WorkerPool,
    settings: CacheSettings,
}

impl CacheLayer {
    pub fn new(
        settings: CacheSettings,
        distributed: Arc<dyn DistributedCache>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            local: Arc::new(LocalTier::new(settings.local_capacity, settings.local_ttl)),
            distributed,
            pool,
            settings,
        }
    }

    pub fn local(&self) -> &LocalTier {
        &self.local
    }

    /// Base TTL plus a uniform jitter so entries written together do not
    /// expire together.
    fn jittered_ttl(&self) -> Duration {
        let jitter_ms = self.settings.ttl_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.settings.ttl;
        }
        self.settings.ttl + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(bytes) = self.local.get(key) {
            if let Some(value) = decode(key, &bytes) {
                return Some(value);
            }
        }

        match self.distributed.get(key).await {
            Ok(Some(bytes)) => {
                let value = decode(key, &bytes)?;
                self.local.put(key, bytes);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Distributed cache read failed");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.distributed
            .set_with_ttl(key, bytes.clone(), self.jittered_ttl())
            .await?;
        self.local.put(key, bytes);
        Ok(())
    }

    /// Read through both tiers, loading from origin on a miss. Cache failures
    /// degrade to an origin read; origin errors are returned unchanged.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, load: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(value) = self.get(key).await {
            tracing::trace!(cache_key = %key, "Cache hit");
            return Ok(value);
        }

        let value = load().await?;
        if let Err(e) = self.set(key, &value).await {
            tracing::warn!(cache_key = %key, error = %e, "Failed to populate cache");
        }
        Ok(value)
    }

    pub async fn invalidate(&self, key: &str) -> InvalidationHandle {
        self.invalidate_target(Target::Key(key.to_string())).await
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> InvalidationHandle {
        self.invalidate_target(Target::Prefix(prefix.to_string())).await
    }

    async fn invalidate_target(&self, target: Target) -> InvalidationHandle {
        purge(&self.local, self.distributed.as_ref(), &target).await;

        let local = self.local.clone();
        let distributed = self.distributed.clone();
        let settings = self.settings.clone();
        let label = target.to_string();

        let submitted = self
            .pool
            .submit(async move {
                tokio::time::sleep(settings.double_delete_delay).await;

                let mut attempts = 0;
                let mut cleared = false;
                while attempts < settings.double_delete_retries {
                    attempts += 1;
                    purge(&local, distributed.as_ref(), &target).await;
                    if is_absent(distributed.as_ref(), &target).await {
                        cleared = true;
                        break;
                    }
                    tokio::time::sleep(settings.double_delete_retry_wait).await;
                }

                if cleared {
                    tracing::debug!(target_key = %target, attempts, "Delayed cache delete completed");
                } else {
                    tracing::warn!(
                        target_key = %target,
                        attempts,
                        "Delayed cache delete exhausted retries"
                    );
                }

                InvalidationReport {
                    target: target.to_string(),
                    attempts,
                    cleared,
                }
            })
            .await;

        match submitted {
            Ok(handle) => InvalidationHandle {
                target: label,
                handle: Some(handle),
            },
            Err(e) => {
                tracing::warn!(target_key = %label, error = %e, "Could not schedule delayed cache delete");
                InvalidationHandle::detached(label)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(cache_key = %key, error = %e, "Discarding undecodable cache entry");
            None
        }
    }
}

/// Delete from both tiers. Errors are logged, never returned.
async fn purge(local: &LocalTier, distributed: &dyn DistributedCache, target: &Target) {
    match target {
        Target::Key(key) => {
            local.remove(key);
            if let Err(e) = distributed.delete(key).await {
                tracing::warn!(cache_key = %key, error = %e, "Cache delete failed");
            }
        }
        Target::Prefix(prefix) => {
            local.remove_prefix(prefix);
            let keys = match distributed.keys_with_prefix(prefix).await {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::warn!(cache_prefix = %prefix, error = %e, "Cache key scan failed");
                    return;
                }
            };
            for key in keys {
                if let Err(e) = distributed.delete(&key).await {
                    tracing::warn!(cache_key = %key, error = %e, "Cache delete failed");
                }
            }
        }
    }
}

async fn is_absent(distributed: &dyn DistributedCache, target: &Target) -> bool {
    let result = match target {
        Target::Key(key) => distributed.exists(key).await.map(|exists| !exists),
        Target::Prefix(prefix) => distributed
            .keys_with_prefix(prefix)
            .await
            .map(|keys| keys.is_empty()),
    };
    result.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::MemoryDistributedCache;
    use galleria_infra::pool::{RejectionPolicy, WorkerPoolConfig};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings() -> CacheSettings {
        CacheSettings {
            local_capacity: 16,
            local_ttl: Duration::from_secs(60),
            ttl: Duration::from_secs(60),
            ttl_jitter: Duration::from_secs(5),
            double_delete_delay: Duration::from_millis(30),
            double_delete_retries: 3,
            double_delete_retry_wait: Duration::from_millis(10),
        }
    }

    fn layer(distributed: MemoryDistributedCache) -> CacheLayer {
        let pool = WorkerPool::new(WorkerPoolConfig::new("cache", 1, 16, RejectionPolicy::Wait));
        CacheLayer::new(settings(), Arc::new(distributed), pool)
    }

    #[tokio::test]
    async fn test_get_or_load_reads_through_once() {
        let cache = layer(MemoryDistributedCache::new());
        let loads = AtomicU32::new(0);

        for _ in 0..3 {
            let value: Vec<String> = cache
                .get_or_load("k", || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["a".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["a".to_string()]);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_origin_errors_are_not_cached() {
        let cache = layer(MemoryDistributedCache::new());
        let result: Result<u32, AppError> = cache
            .get_or_load("k", || async { Err(AppError::NotFound("gone".into())) })
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(cache.get::<u32>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_double_delete_removes_stale_repopulation() {
        let distributed = MemoryDistributedCache::new();
        let cache = layer(distributed.clone());
        cache.set("picture", &"v1").await.unwrap();

        let handle = cache.invalidate("picture").await;
        assert!(cache.local().get("picture").is_none());

        // A reader that fetched v1 before the write lands repopulates the
        // distributed tier after the first delete.
        distributed
            .set_with_ttl("picture", serde_json::to_vec("v1").unwrap(), Duration::from_secs(60))
            .await
            .unwrap();

        let report = handle.wait().await;
        assert!(report.cleared);
        assert_eq!(report.attempts, 1);
        assert!(!distributed.exists("picture").await.unwrap());

        let fresh: String = cache
            .get_or_load("picture", || async { Ok("v2".to_string()) })
            .await
            .unwrap();
        assert_eq!(fresh, "v2");
    }

    #[tokio::test]
    async fn test_delayed_delete_retries_failures() {
        let distributed = MemoryDistributedCache::new();
        let cache = layer(distributed.clone());
        cache.set("k", &1u32).await.unwrap();

        // First delete fails, so the key survives the immediate pass and the
        // first delayed attempt.
        distributed.fail_next_deletes(2);
        let report = cache.invalidate("k").await.wait().await;
        assert!(report.cleared);
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let distributed = MemoryDistributedCache::new();
        let cache = layer(distributed.clone());
        cache.set("list:a", &1u32).await.unwrap();
        cache.set("list:b", &2u32).await.unwrap();
        cache.set("detail:a", &3u32).await.unwrap();

        let report = cache.invalidate_prefix("list:").await.wait().await;
        assert!(report.cleared);
        assert!(distributed.keys_with_prefix("list:").await.unwrap().is_empty());
        assert_eq!(cache.get::<u32>("detail:a").await, Some(3));
    }
}
