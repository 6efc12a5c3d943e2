#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use galleria_cache::{CacheLayer, CacheSettings, MemoryDistributedCache};
use galleria_core::{
    Derivative, ModerationStatus, PictureAsset, ReviewQueueConfig, ReviewTask,
};
use galleria_db::{InMemoryPictureRepository, PictureRepository};
use galleria_infra::{RejectionPolicy, WorkerPool, WorkerPoolConfig};
use galleria_storage::{MemoryStorage, Storage};
use galleria_worker::{
    MemoryOverflowStore, ModerationError, ModerationLabel, ModerationPolicy, ModerationQuery,
    ModerationService, ModerationWorker, ModerationWorkerConfig, Notification, NotificationSink,
    PollSettings, ReviewQueue, RiskLevel,
};
use uuid::Uuid;

/// Moderation service that answers every query with the same response.
pub struct ScriptedModeration {
    response: ModerationQuery,
    created: AtomicUsize,
    queried: AtomicUsize,
}

impl ScriptedModeration {
    pub fn verdict(risk_level: RiskLevel, labels: Vec<ModerationLabel>) -> Arc<Self> {
        Self::with_response(ModerationQuery::Success { risk_level, labels })
    }

    pub fn always_processing() -> Arc<Self> {
        Self::with_response(ModerationQuery::Processing)
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Self::with_response(ModerationQuery::Failure {
            reason: reason.to_string(),
        })
    }

    fn with_response(response: ModerationQuery) -> Arc<Self> {
        Arc::new(Self {
            response,
            created: AtomicUsize::new(0),
            queried: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModerationService for ScriptedModeration {
    async fn create_task(&self, _image_url: &str) -> Result<String, ModerationError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("task-{}", n))
    }

    async fn query_task(&self, _task_id: &str) -> Result<ModerationQuery, ModerationError> {
        self.queried.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Moderation service whose queries block until the test opens the gate.
pub struct GatedModeration {
    response: ModerationQuery,
    gate: Semaphore,
    entered: Notify,
    submitted: Mutex<Vec<String>>,
}

impl GatedModeration {
    pub fn verdict(risk_level: RiskLevel, labels: Vec<ModerationLabel>) -> Arc<Self> {
        Arc::new(Self {
            response: ModerationQuery::Success { risk_level, labels },
            gate: Semaphore::new(0),
            entered: Notify::new(),
            submitted: Mutex::new(Vec::new()),
        })
    }

    /// Resolves once a query is waiting at the gate.
    pub async fn query_started(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting query answer.
    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    /// Image URLs handed to `create_task`, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModerationService for GatedModeration {
    async fn create_task(&self, image_url: &str) -> Result<String, ModerationError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(image_url.to_string());
        Ok(format!("task-{}", submitted.len()))
    }

    async fn query_task(&self, _task_id: &str) -> Result<ModerationQuery, ModerationError> {
        self.entered.notify_one();
        self.gate.acquire().await.unwrap().forget();
        Ok(self.response.clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub fn label(name: &str, confidence: f32) -> ModerationLabel {
    ModerationLabel {
        label: name.to_string(),
        confidence,
        threshold: None,
        description: None,
    }
}

pub fn queue_config(capacity: usize) -> ReviewQueueConfig {
    ReviewQueueConfig {
        capacity,
        overflow_store_path: None,
        stale_claim_grace_secs: 300,
        cas_attempts: 16,
    }
}

pub fn cache_layer(distributed: MemoryDistributedCache) -> CacheLayer {
    let settings = CacheSettings {
        local_capacity: 64,
        local_ttl: Duration::from_secs(5),
        ttl: Duration::from_secs(60),
        ttl_jitter: Duration::ZERO,
        double_delete_delay: Duration::from_millis(10),
        double_delete_retries: 2,
        double_delete_retry_wait: Duration::from_millis(5),
    };
    let pool = WorkerPool::new(WorkerPoolConfig::new("cache", 2, 32, RejectionPolicy::Wait));
    CacheLayer::new(settings, Arc::new(distributed), pool)
}

pub struct WorkerFixture {
    pub worker: Arc<ModerationWorker>,
    pub queue: Arc<ReviewQueue>,
    pub repository: Arc<InMemoryPictureRepository>,
    pub storage: MemoryStorage,
    pub sink: Arc<RecordingSink>,
    pub distributed: MemoryDistributedCache,
    pub cache: CacheLayer,
}

pub struct FixtureOptions {
    pub max_review_cycles: u32,
    pub poll: PollSettings,
    pub pool_workers: usize,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            max_review_cycles: 3,
            poll: PollSettings {
                interval: Duration::from_millis(2),
                max_attempts: 3,
                deadline: Duration::from_secs(5),
            },
            pool_workers: 2,
        }
    }
}

pub fn worker_fixture(
    service: Arc<dyn ModerationService>,
    options: FixtureOptions,
) -> WorkerFixture {
    let queue = Arc::new(ReviewQueue::new(
        &queue_config(100),
        Arc::new(MemoryOverflowStore::new()),
    ));
    let repository = Arc::new(InMemoryPictureRepository::new());
    let storage = MemoryStorage::new();
    let sink = Arc::new(RecordingSink::default());
    let distributed = MemoryDistributedCache::new();
    let cache = cache_layer(distributed.clone());

    let policy = ModerationPolicy::new(
        HashMap::from([("violent_gunKnives".to_string(), 100.0)]),
        80.0,
    );
    let pool = WorkerPool::new(WorkerPoolConfig::new(
        "moderation",
        options.pool_workers,
        0,
        RejectionPolicy::Reject,
    ));
    let config = ModerationWorkerConfig {
        tick_interval: Duration::from_millis(5),
        poll: options.poll,
        max_review_cycles: options.max_review_cycles,
        image_url_ttl: Duration::from_secs(60),
        reclaim_every_ticks: 0,
    };

    let worker = Arc::new(ModerationWorker::new(
        queue.clone(),
        repository.clone(),
        Arc::new(storage.clone()),
        service,
        policy,
        sink.clone(),
        cache.clone(),
        pool,
        config,
    ));

    WorkerFixture {
        worker,
        queue,
        repository,
        storage,
        sink,
        distributed,
        cache,
    }
}

pub fn pending_picture(owner_id: Uuid) -> PictureAsset {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let derivative = |suffix: &str| {
        let path = format!("public/{}/{}{}.webp", owner_id, id, suffix);
        Derivative {
            url: format!("memory://pictures/{}", path),
            storage_path: path,
            format: "webp".to_string(),
        }
    };

    PictureAsset {
        id,
        owner_id,
        space_id: None,
        name: "sunset".to_string(),
        original_filename: "sunset.png".to_string(),
        content_hash: format!("{:064x}", id.as_u128()),
        thumbnail: derivative("_thumbnail"),
        default: derivative(""),
        original: derivative("_original"),
        size_bytes: 1024,
        width: 640,
        height: 480,
        aspect_ratio: 1.33,
        format: "png".to_string(),
        dominant_color: None,
        moderation_status: ModerationStatus::Pending,
        moderation_message: None,
        reviewer_id: None,
        created_at: now,
        edited_at: now,
        reviewed_at: None,
        version: 1,
    }
}

impl WorkerFixture {
    /// Store a pending picture with its default derivative and queue it.
    pub async fn seed_pending(&self) -> PictureAsset {
        let asset = pending_picture(Uuid::new_v4());
        self.storage
            .put(
                &asset.default.storage_path,
                Bytes::from_static(b"webp"),
                "image/webp",
            )
            .await
            .unwrap();
        let asset = self.repository.insert(&asset).await.unwrap();
        self.queue
            .enqueue(ReviewTask::for_asset(&asset))
            .await
            .unwrap();
        asset
    }

    pub async fn status_of(&self, id: Uuid) -> PictureAsset {
        self.repository.get(id).await.unwrap().unwrap()
    }
}
