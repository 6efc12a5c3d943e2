#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use galleria_cache::{CacheLayer, CacheSettings, MemoryDistributedCache};
use galleria_core::{IngestConfig, ReviewQueueConfig};
use galleria_db::InMemoryPictureRepository;
use galleria_infra::{RejectionPolicy, WorkerPool, WorkerPoolConfig};
use galleria_processing::DerivativeGenerator;
use galleria_services::{IngestionCoordinator, PictureQueryService};
use galleria_storage::MemoryStorage;
use galleria_worker::{MemoryOverflowStore, ReviewQueue};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub struct IngestFixture {
    pub coordinator: Arc<IngestionCoordinator>,
    pub query: PictureQueryService,
    pub storage: MemoryStorage,
    pub repository: Arc<InMemoryPictureRepository>,
    pub queue: Arc<ReviewQueue>,
    pub cache: CacheLayer,
}

pub fn ingest_fixture(unit_retries: u32) -> IngestFixture {
    let config = IngestConfig {
        unit_retries,
        ..IngestConfig::default()
    };

    let storage = MemoryStorage::new();
    let repository = Arc::new(InMemoryPictureRepository::new());
    let queue = Arc::new(ReviewQueue::new(
        &ReviewQueueConfig::default(),
        Arc::new(MemoryOverflowStore::new()),
    ));

    let cache_pool = WorkerPool::new(WorkerPoolConfig::new("cache", 2, 64, RejectionPolicy::Wait));
    let cache = CacheLayer::new(
        CacheSettings {
            local_capacity: 64,
            local_ttl: Duration::from_secs(5),
            ttl: Duration::from_secs(60),
            ttl_jitter: Duration::from_secs(1),
            double_delete_delay: Duration::from_millis(10),
            double_delete_retries: 2,
            double_delete_retry_wait: Duration::from_millis(5),
        },
        Arc::new(MemoryDistributedCache::new()),
        cache_pool,
    );

    let pool = WorkerPool::new(WorkerPoolConfig::new("ingest", 4, 64, RejectionPolicy::Reject));
    let coordinator = Arc::new(IngestionCoordinator::new(
        &config,
        DerivativeGenerator::default(),
        Arc::new(storage.clone()),
        repository.clone(),
        queue.clone(),
        cache.clone(),
        pool,
    ));
    let query = PictureQueryService::new(repository.clone(), cache.clone());

    IngestFixture {
        coordinator,
        query,
        storage,
        repository,
        queue,
        cache,
    }
}

/// A PNG whose bytes are unique per `seed`.
pub fn png(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x as u8).wrapping_mul(3).wrapping_add(seed),
            (y as u8).wrapping_mul(5),
            seed,
        ])
    });
    encode(DynamicImage::ImageRgb8(image))
}

pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb(color),
    )))
}

fn encode(image: DynamicImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}
