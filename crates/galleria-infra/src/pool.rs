//! Bounded worker pools
//!
//! Every pool in the process (ingestion fan-out, moderation, delayed cache
//! deletes) is a `WorkerPool` built once at startup and passed explicitly to
//! its users. A pool runs at most `workers` jobs at a time and admits at most
//! `workers + queue_depth` jobs overall; what happens past that point is the
//! pool's `RejectionPolicy`.

use std::future::Future;
use std::sync::Arc;

use galleria_core::AppError;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionPolicy {
    /// Fail the submission immediately with `PoolError::Saturated`.
    Reject,
    /// Wait for an admission slot.
    Wait,
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub name: &'static str,
    pub workers: usize,
    pub queue_depth: usize,
    pub rejection: RejectionPolicy,
}

impl WorkerPoolConfig {
    pub fn new(
        name: &'static str,
        workers: usize,
        queue_depth: usize,
        rejection: RejectionPolicy,
    ) -> Self {
        Self {
            name,
            workers: workers.max(1),
            queue_depth,
            rejection,
        }
    }

    pub fn capacity(&self) -> usize {
        self.workers + self.queue_depth
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool '{pool}' is saturated ({capacity} jobs admitted)")]
    Saturated { pool: &'static str, capacity: usize },

    #[error("Worker pool '{0}' is shut down")]
    Closed(&'static str),
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        AppError::Overloaded(err.to_string())
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    config: Arc<WorkerPoolConfig>,
    admission: Arc<Semaphore>,
    running: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let admission = Arc::new(Semaphore::new(config.capacity()));
        let running = Arc::new(Semaphore::new(config.workers));

        tracing::debug!(
            pool = config.name,
            workers = config.workers,
            queue_depth = config.queue_depth,
            rejection = ?config.rejection,
            "Worker pool created"
        );

        Self {
            config: Arc::new(config),
            admission,
            running,
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    /// Jobs admitted and not yet finished (running or queued).
    pub fn in_flight(&self) -> usize {
        self.capacity()
            .saturating_sub(self.admission.available_permits())
    }

    pub fn has_capacity(&self) -> bool {
        !self.admission.is_closed() && self.admission.available_permits() > 0
    }

    /// Submit an async job. The returned handle may be dropped to detach the job.
    pub async fn submit<F>(&self, job: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let admission = match self.config.rejection {
            RejectionPolicy::Reject => {
                self.admission
                    .clone()
                    .try_acquire_owned()
                    .map_err(|e| match e {
                        TryAcquireError::NoPermits => {
                            tracing::warn!(
                                pool = self.config.name,
                                capacity = self.capacity(),
                                "Worker pool saturated, rejecting job"
                            );
                            PoolError::Saturated {
                                pool: self.config.name,
                                capacity: self.capacity(),
                            }
                        }
                        TryAcquireError::Closed => PoolError::Closed(self.config.name),
                    })?
            }
            RejectionPolicy::Wait => self
                .admission
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed(self.config.name))?,
        };

        let running = self.running.clone();
        Ok(tokio::spawn(async move {
            let _admission = admission;
            // The running semaphore is never closed, so a failed acquire cannot happen.
            let _slot = running.acquire_owned().await.ok();
            job.await
        }))
    }

    /// Submit a CPU-bound closure; it runs on the blocking thread pool while
    /// holding one of this pool's worker slots.
    pub async fn submit_blocking<F, R>(
        &self,
        job: F,
    ) -> Result<JoinHandle<Result<R, tokio::task::JoinError>>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(async move { tokio::task::spawn_blocking(job).await })
            .await
    }

    /// Wait until every admitted job has finished.
    pub async fn wait_idle(&self) {
        let capacity = self.capacity() as u32;
        if let Ok(all) = self.admission.acquire_many(capacity).await {
            drop(all);
        }
    }

    /// Stop admitting jobs, then wait for the admitted ones to finish.
    pub async fn shutdown(&self) {
        let capacity = self.capacity() as u32;
        let drained = self.admission.acquire_many(capacity).await;
        self.admission.close();
        drop(drained);
        tracing::info!(pool = self.config.name, "Worker pool shut down");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.config.name)
            .field("workers", &self.config.workers)
            .field("queue_depth", &self.config.queue_depth)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_submit_returns_job_output() {
        let pool = WorkerPool::new(WorkerPoolConfig::new("test", 2, 2, RejectionPolicy::Reject));
        let handle = pool.submit(async { 21 * 2 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_reject_policy_fails_when_saturated() {
        let pool = WorkerPool::new(WorkerPoolConfig::new("tiny", 1, 1, RejectionPolicy::Reject));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (second_tx, second_rx) = oneshot::channel::<()>();

        let first = pool
            .submit(async move {
                let _ = release_rx.await;
            })
            .await
            .unwrap();
        let second = pool
            .submit(async move {
                let _ = second_rx.await;
            })
            .await
            .unwrap();

        let third = pool.submit(async {}).await;
        assert!(matches!(third, Err(PoolError::Saturated { capacity: 2, .. })));
        assert_eq!(pool.in_flight(), 2);
        assert!(!pool.has_capacity());

        release_tx.send(()).unwrap();
        second_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        pool.wait_idle().await;
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_policy_limits_concurrency() {
        let pool = WorkerPool::new(WorkerPoolConfig::new("waiting", 2, 0, RejectionPolicy::Wait));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            handles.push(
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap(),
            );
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(WorkerPoolConfig::new("closing", 1, 0, RejectionPolicy::Wait));
        pool.shutdown().await;
        assert!(matches!(pool.submit(async {}).await, Err(PoolError::Closed("closing"))));
    }

    #[tokio::test]
    async fn test_submit_blocking_runs_closure() {
        let pool = WorkerPool::new(WorkerPoolConfig::new("cpu", 1, 4, RejectionPolicy::Reject));
        let handle = pool.submit_blocking(|| (1..=10).sum::<u32>()).await.unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 55);
    }

    #[test]
    fn test_pool_error_maps_to_overloaded() {
        let err: AppError = PoolError::Saturated {
            pool: "ingest",
            capacity: 8,
        }
        .into();
        assert!(matches!(err, AppError::Overloaded(_)));
    }
}
