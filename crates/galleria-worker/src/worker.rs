//! Moderation worker
//!
//! A scheduler fires every `tick_interval`, claims at most one review task and
//! hands it to the moderation worker pool. The pool's job submits the picture
//! to the moderation service, polls for a verdict and applies it. Anything
//! short of a verdict releases the task for a later tick; after
//! `max_review_cycles` releases the picture is escalated to manual review.

use std::sync::Arc;
use std::time::{Duration, Instant};

use galleria_cache::CacheLayer;
use galleria_core::constants::{picture_detail_cache_key, PICTURE_LIST_CACHE_PREFIX};
use galleria_core::{AppError, ModerationConfig, ModerationStatus, StorageConfig, TaskError};
use galleria_db::{PictureRepository, ReviewApplied};
use galleria_infra::WorkerPool;
use galleria_storage::Storage;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::moderation::{
    poll_until_terminal, ModerationPolicy, ModerationService, PollOutcome, PollSettings,
};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::queue::{ClaimedTask, ReviewQueue};

pub const ESCALATION_MESSAGE: &str = "escalated to manual review";

/// Reclaim stale overflow claims once per this many ticks.
const RECLAIM_EVERY_TICKS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ModerationWorkerConfig {
    pub tick_interval: Duration,
    pub poll: PollSettings,
    pub max_review_cycles: u32,
    /// Lifetime of the URL handed to the moderation service.
    pub image_url_ttl: Duration,
    pub reclaim_every_ticks: u64,
}

impl ModerationWorkerConfig {
    pub fn from_config(moderation: &ModerationConfig, storage: &StorageConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(moderation.tick_interval_ms.max(1)),
            poll: PollSettings::from(moderation),
            max_review_cycles: moderation.max_review_cycles,
            image_url_ttl: Duration::from_secs(storage.presigned_url_ttl_secs),
            reclaim_every_ticks: RECLAIM_EVERY_TICKS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approved,
    Rejected,
    /// The picture had already been reviewed; nothing changed.
    AlreadyTerminal,
    /// The content was replaced after this task was queued. The replacement
    /// queued its own review, so this one is acknowledged without a verdict.
    Superseded,
    /// Returned to the queue for a later tick.
    Released { cycles: u32 },
    Escalated,
    /// Unrecoverable; acknowledged without a verdict.
    Dropped,
}

pub struct ModerationWorker {
    queue: Arc<ReviewQueue>,
    repository: Arc<dyn PictureRepository>,
    storage: Arc<dyn Storage>,
    service: Arc<dyn ModerationService>,
    policy: ModerationPolicy,
    notifier: Arc<dyn NotificationSink>,
    cache: CacheLayer,
    pool: WorkerPool,
    config: ModerationWorkerConfig,
    shutdown: CancellationToken,
}

impl ModerationWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<ReviewQueue>,
        repository: Arc<dyn PictureRepository>,
        storage: Arc<dyn Storage>,
        service: Arc<dyn ModerationService>,
        policy: ModerationPolicy,
        notifier: Arc<dyn NotificationSink>,
        cache: CacheLayer,
        pool: WorkerPool,
        config: ModerationWorkerConfig,
    ) -> Self {
        Self {
            queue,
            repository,
            storage,
            service,
            policy,
            notifier,
            cache,
            pool,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> &Arc<ReviewQueue> {
        &self.queue
    }

    /// Start the scheduler loop. Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks: u64 = 0;

            tracing::info!(
                tick_interval_ms = self.config.tick_interval.as_millis() as u64,
                pool = self.pool.name(),
                max_review_cycles = self.config.max_review_cycles,
                "Moderation worker started"
            );

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        ticks += 1;
                        if self.config.reclaim_every_ticks > 0
                            && ticks % self.config.reclaim_every_ticks == 0
                        {
                            if let Err(e) = self.queue.reclaim_stale().await {
                                tracing::error!(error = %e, "Stale review claim reaper failed");
                            }
                        }
                        // The handle is dropped; the job runs detached on the pool.
                        let _ = self.tick().await;
                    }
                }
            }

            tracing::info!("Moderation worker stopped");
        })
    }

    /// Stop scheduling, cancel in-flight polls and wait for the pool to drain.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.pool.shutdown().await;
    }

    /// Claim at most one task and submit it to the pool.
    pub async fn tick(self: &Arc<Self>) -> Option<JoinHandle<ReviewOutcome>> {
        if !self.pool.has_capacity() {
            tracing::debug!(pool = self.pool.name(), "Moderation pool busy, skipping claim");
            return None;
        }

        let claimed = match self.queue.dequeue_one().await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                tracing::trace!("No review tasks available");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to dequeue review task");
                return None;
            }
        };

        let worker = Arc::clone(self);
        let retained = claimed.clone();
        match self
            .pool
            .submit(async move { worker.process(claimed).await })
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(
                    picture_id = %retained.picture_id(),
                    error = %e,
                    "Moderation pool rejected task, releasing it"
                );
                if let Err(e) = self.queue.release(retained).await {
                    tracing::error!(error = %e, "Failed to release rejected review task");
                }
                None
            }
        }
    }

    /// Run one review to completion and settle the task.
    #[tracing::instrument(skip(self, claimed), fields(picture_id = %claimed.picture_id(), cycles = claimed.task.cycles))]
    pub async fn process(&self, claimed: ClaimedTask) -> ReviewOutcome {
        let start = Instant::now();

        let outcome = match self.moderate(&claimed).await {
            Ok(outcome) => {
                self.acknowledge(&claimed).await;
                outcome
            }
            Err(err) if err.is_recoverable() => self.retry_later(claimed, &err).await,
            Err(err) => {
                tracing::warn!(error = %err, "Dropping review task");
                self.acknowledge(&claimed).await;
                ReviewOutcome::Dropped
            }
        };

        tracing::info!(
            outcome = ?outcome,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Review task processed"
        );
        outcome
    }

    async fn moderate(&self, claimed: &ClaimedTask) -> Result<ReviewOutcome, TaskError> {
        let picture_id = claimed.picture_id();
        let asset = self.repository.get(picture_id).await?.ok_or_else(|| {
            TaskError::from(AppError::NotFound(format!("Picture {} not found", picture_id)))
        })?;

        if asset.version != claimed.task.version {
            tracing::debug!(
                task_version = claimed.task.version,
                current_version = asset.version,
                "Picture content replaced since the task was queued"
            );
            return Ok(ReviewOutcome::Superseded);
        }

        if asset.moderation_status.is_terminal() {
            tracing::debug!(status = %asset.moderation_status, "Picture already reviewed");
            return Ok(ReviewOutcome::AlreadyTerminal);
        }

        let image_url = self
            .storage
            .presigned_url(&asset.default.storage_path, self.config.image_url_ttl)
            .await
            .map_err(AppError::from)?;
        let task_id = self
            .service
            .create_task(&image_url)
            .await
            .map_err(AppError::from)?;

        let polled = poll_until_terminal(
            self.service.as_ref(),
            &task_id,
            &self.config.poll,
            &self.shutdown,
        )
        .await
        .map_err(AppError::from)?;

        let (risk_level, labels) = match polled {
            PollOutcome::Completed { risk_level, labels } => (risk_level, labels),
            PollOutcome::Failed(reason) => {
                return Err(TaskError::recoverable(AppError::dependency(
                    "moderation",
                    format!("task {} failed: {}", task_id, reason),
                )))
            }
            PollOutcome::TimedOut { attempts } => {
                return Err(TaskError::recoverable(AppError::Timeout(format!(
                    "moderation task {} still processing after {} polls",
                    task_id, attempts
                ))))
            }
            PollOutcome::Cancelled => {
                return Err(TaskError::recoverable(AppError::Internal(
                    "moderation poll cancelled by shutdown".to_string(),
                )))
            }
        };

        let decision = self.policy.decide(risk_level, &labels);
        match self
            .repository
            .apply_review(picture_id, claimed.task.version, &decision)
            .await?
        {
            ReviewApplied::Applied => {
                let kind = match decision.status {
                    ModerationStatus::Rejected => NotificationKind::Rejected,
                    _ => NotificationKind::Approved,
                };
                self.notifier
                    .notify(Notification {
                        owner_id: asset.owner_id,
                        picture_id,
                        kind,
                        message: decision.message.clone(),
                    })
                    .await;
                self.invalidate(picture_id).await;

                Ok(match decision.status {
                    ModerationStatus::Rejected => ReviewOutcome::Rejected,
                    _ => ReviewOutcome::Approved,
                })
            }
            ReviewApplied::AlreadyTerminal(status) => {
                tracing::debug!(status = %status, "Picture reviewed concurrently, not notifying");
                Ok(ReviewOutcome::AlreadyTerminal)
            }
            ReviewApplied::Superseded { current_version } => {
                tracing::info!(
                    task_version = claimed.task.version,
                    current_version,
                    "Picture content replaced during review, discarding verdict"
                );
                Ok(ReviewOutcome::Superseded)
            }
        }
    }

    async fn retry_later(&self, claimed: ClaimedTask, err: &TaskError) -> ReviewOutcome {
        if claimed.task.cycles >= self.config.max_review_cycles {
            return self.escalate(claimed).await;
        }

        tracing::warn!(error = %err, "Moderation attempt did not finish, releasing task");
        let next = claimed.task.cycles + 1;
        match self.queue.release(claimed).await {
            Ok(cycles) => ReviewOutcome::Released { cycles },
            Err(e) => {
                tracing::error!(error = %e, "Failed to release review task");
                ReviewOutcome::Released { cycles: next }
            }
        }
    }

    async fn escalate(&self, claimed: ClaimedTask) -> ReviewOutcome {
        let picture_id = claimed.picture_id();
        let escalated = self
            .repository
            .escalate(picture_id, claimed.task.version, ESCALATION_MESSAGE)
            .await;
        match escalated {
            Ok(ReviewApplied::Applied) => {
                tracing::error!(
                    owner_id = %claimed.task.owner_id,
                    cycles = claimed.task.cycles,
                    "Automated review exhausted, escalated to manual review"
                );
                self.notifier
                    .notify(Notification {
                        owner_id: claimed.task.owner_id,
                        picture_id,
                        kind: NotificationKind::EscalatedToManualReview,
                        message: Some(ESCALATION_MESSAGE.to_string()),
                    })
                    .await;
                self.invalidate(picture_id).await;
            }
            Ok(ReviewApplied::AlreadyTerminal(_)) => {}
            Ok(ReviewApplied::Superseded { .. }) => {
                self.acknowledge(&claimed).await;
                return ReviewOutcome::Superseded;
            }
            Err(AppError::NotFound(_)) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to escalate picture, releasing task");
                let next = claimed.task.cycles + 1;
                return match self.queue.release(claimed).await {
                    Ok(cycles) => ReviewOutcome::Released { cycles },
                    Err(_) => ReviewOutcome::Released { cycles: next },
                };
            }
        }

        self.acknowledge(&claimed).await;
        ReviewOutcome::Escalated
    }

    async fn acknowledge(&self, claimed: &ClaimedTask) {
        if let Err(e) = self.queue.acknowledge(claimed).await {
            // The claim marker stays; the reaper hands the task out again and
            // the conditional update makes the repeat a no-op.
            tracing::error!(error = %e, "Failed to acknowledge review task");
        }
    }

    async fn invalidate(&self, picture_id: Uuid) {
        drop(self.cache.invalidate(&picture_detail_cache_key(picture_id)).await);
        drop(self.cache.invalidate_prefix(PICTURE_LIST_CACHE_PREFIX).await);
    }
}
