use std::sync::Arc;

use galleria_infra::WorkerPool;
use galleria_services::{IngestionCoordinator, PictureQueryService};
use galleria_worker::{ModerationWorker, ReviewQueue};

/// Everything a command needs, built once by `setup::initialize_app`.
pub struct AppContext {
    pub coordinator: Arc<IngestionCoordinator>,
    pub query: PictureQueryService,
    pub queue: Arc<ReviewQueue>,
    /// Absent when no moderation endpoint is configured.
    pub worker: Option<Arc<ModerationWorker>>,
    pub ingest_pool: WorkerPool,
    pub cache_pool: WorkerPool,
}

impl AppContext {
    /// Stop the worker, let in-flight jobs and delayed cache deletes finish,
    /// then move queued reviews to the overflow store.
    pub async fn shutdown(&self) {
        if let Some(worker) = &self.worker {
            worker.shutdown().await;
        }
        self.ingest_pool.shutdown().await;
        self.cache_pool.shutdown().await;

        match self.queue.spill_memory().await {
            Ok(0) => {}
            Ok(spilled) => tracing::info!(spilled, "Queued reviews persisted for next start"),
            Err(e) => tracing::error!(error = %e, "Failed to persist queued reviews"),
        }
        tracing::info!("Shutdown complete");
    }
}
