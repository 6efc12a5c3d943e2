//! Wire repositories, queue, cache and the pipeline services together.

use std::sync::Arc;

use anyhow::{Context, Result};
use galleria_cache::{
    CacheLayer, CacheSettings, DistributedCache, MemoryDistributedCache, PgDistributedCache,
};
use galleria_core::GalleriaConfig;
use galleria_db::{InMemoryPictureRepository, PgPictureRepository, PictureRepository};
use galleria_infra::{RejectionPolicy, WorkerPool, WorkerPoolConfig};
use galleria_processing::{DerivativeGenerator, DerivativeSettings};
use galleria_services::{IngestionCoordinator, PictureQueryService, RemoteFetcher};
use galleria_storage::Storage;
use galleria_worker::{
    FileOverflowStore, HttpModerationClient, MemoryOverflowStore, ModerationPolicy,
    ModerationService, ModerationWorker, ModerationWorkerConfig, OverflowStore, ReviewQueue,
    TracingNotificationSink,
};
use sqlx::PgPool;

use crate::context::AppContext;

pub async fn initialize_services(
    config: &GalleriaConfig,
    db_pool: Option<PgPool>,
    storage: Arc<dyn Storage>,
) -> Result<AppContext> {
    let (repository, distributed): (Arc<dyn PictureRepository>, Arc<dyn DistributedCache>) =
        match db_pool {
            Some(pool) => {
                let distributed = PgDistributedCache::new(pool.clone());
                match distributed.purge_expired().await {
                    Ok(purged) => tracing::debug!(purged, "Expired cache entries purged"),
                    Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache entries"),
                }
                (
                    Arc::new(PgPictureRepository::new(pool)),
                    Arc::new(distributed),
                )
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, pictures and the shared cache tier are kept in memory only"
                );
                (
                    Arc::new(InMemoryPictureRepository::new()),
                    Arc::new(MemoryDistributedCache::new()),
                )
            }
        };

    let overflow: Arc<dyn OverflowStore> = match &config.review_queue.overflow_store_path {
        Some(path) => Arc::new(
            FileOverflowStore::open(path)
                .await
                .with_context(|| format!("Failed to open overflow store at {}", path))?,
        ),
        None => {
            tracing::warn!("OVERFLOW_STORE_PATH not set, review overflow is not durable");
            Arc::new(MemoryOverflowStore::new())
        }
    };
    let queue = Arc::new(ReviewQueue::new(&config.review_queue, overflow));
    let reclaimed = queue
        .reclaim_stale()
        .await
        .context("Failed to reclaim stale review claims")?;
    tracing::info!(
        capacity = queue.capacity(),
        reclaimed,
        overflow_len = queue.overflow_len().await.unwrap_or(0),
        "Review queue initialized"
    );

    let cache_pool = WorkerPool::new(WorkerPoolConfig::new(
        "cache-invalidation",
        config.cache.pool_workers,
        config.cache.pool_queue_depth,
        RejectionPolicy::Wait,
    ));
    let cache = CacheLayer::new(
        CacheSettings::from(&config.cache),
        distributed,
        cache_pool.clone(),
    );

    let ingest_pool = WorkerPool::new(WorkerPoolConfig::new(
        "ingest",
        config.ingest.pool_workers,
        config.ingest.pool_queue_depth,
        RejectionPolicy::Reject,
    ));
    let generator = DerivativeGenerator::new(
        DerivativeSettings::from_config(&config.derivatives)
            .context("Invalid derivative configuration")?,
    );
    let fetcher = RemoteFetcher::from_config(&config.ingest)
        .context("Failed to build remote fetcher")?;
    let coordinator = Arc::new(
        IngestionCoordinator::new(
            &config.ingest,
            generator,
            storage.clone(),
            repository.clone(),
            queue.clone(),
            cache.clone(),
            ingest_pool.clone(),
        )
        .with_remote_fetcher(fetcher),
    );

    let query = PictureQueryService::new(repository.clone(), cache.clone());

    let worker = match HttpModerationClient::new(&config.moderation) {
        Ok(client) => {
            let service: Arc<dyn ModerationService> = Arc::new(client);
            let moderation_pool = WorkerPool::new(WorkerPoolConfig::new(
                "moderation",
                config.moderation.pool_workers,
                config.moderation.pool_queue_depth,
                RejectionPolicy::Reject,
            ));
            Some(Arc::new(ModerationWorker::new(
                queue.clone(),
                repository.clone(),
                storage.clone(),
                service,
                ModerationPolicy::from_config(&config.moderation),
                Arc::new(TracingNotificationSink),
                cache.clone(),
                moderation_pool,
                ModerationWorkerConfig::from_config(&config.moderation, &config.storage),
            )))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Moderation service unavailable, reviews stay queued");
            None
        }
    };

    Ok(AppContext {
        coordinator,
        query,
        queue,
        worker,
        ingest_pool,
        cache_pool,
    })
}
