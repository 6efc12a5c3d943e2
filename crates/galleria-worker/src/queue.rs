//! Review queue: bounded in-memory channel with durable overflow.
//!
//! `enqueue` never blocks. Tasks that do not fit in memory are written to the
//! overflow store under `review:task:<id>` and their id appended to the
//! `review:pending` list. Claims on overflow entries are taken by rewriting the
//! entry to `<id>|processing|<unix millis>` through a whole-list
//! compare-and-swap, so an entry is in flight with at most one worker.
//! Memory claims are tracked per process; a picture claimed from either
//! source is not handed out again until its claim is settled.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use galleria_core::constants::{review_task_key, PROCESSING_MARKER, REVIEW_PENDING_LIST};
use galleria_core::{AppError, ReviewQueueConfig, ReviewTask};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use uuid::Uuid;

use crate::overflow::OverflowStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSource {
    Memory,
    Overflow,
}

/// A task handed to exactly one worker. Must be acknowledged or released.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task: ReviewTask,
    pub source: TaskSource,
    /// The marked list entry owned by this claim (overflow only).
    entry: Option<String>,
}

impl ClaimedTask {
    pub fn picture_id(&self) -> Uuid {
        self.task.picture_id
    }
}

/// A `review:pending` entry split into its id and optional claim time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry<'a> {
    id: &'a str,
    claimed_at_millis: Option<i64>,
    marked: bool,
}

impl<'a> PendingEntry<'a> {
    fn parse(raw: &'a str) -> Self {
        let mut parts = raw.splitn(3, '|');
        let id = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (Some(PROCESSING_MARKER), millis) => PendingEntry {
                id,
                claimed_at_millis: millis.and_then(|m| m.parse().ok()),
                marked: true,
            },
            _ => PendingEntry {
                id,
                claimed_at_millis: None,
                marked: false,
            },
        }
    }
}

fn marked_entry(id: &str) -> String {
    format!("{}|{}|{}", id, PROCESSING_MARKER, Utc::now().timestamp_millis())
}

pub struct ReviewQueue {
    sender: mpsc::Sender<ReviewTask>,
    receiver: Mutex<mpsc::Receiver<ReviewTask>>,
    store: Arc<dyn OverflowStore>,
    /// Pictures held by an unsettled memory claim in this process.
    memory_claims: Mutex<HashSet<Uuid>>,
    capacity: usize,
    stale_claim_grace: Duration,
    cas_attempts: usize,
}

impl ReviewQueue {
    pub fn new(config: &ReviewQueueConfig, store: Arc<dyn OverflowStore>) -> Self {
        let capacity = config.capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            store,
            memory_claims: Mutex::new(HashSet::new()),
            capacity,
            stale_claim_grace: Duration::from_secs(config.stale_claim_grace_secs),
            cas_attempts: config.cas_attempts.max(1),
        }
    }

    /// Offer to memory; spill to the overflow store when memory is full.
    #[tracing::instrument(skip(self, task), fields(picture_id = %task.picture_id))]
    pub async fn enqueue(&self, task: ReviewTask) -> Result<TaskSource, AppError> {
        match self.sender.try_send(task) {
            Ok(()) => {
                tracing::debug!("Review task queued in memory");
                Ok(TaskSource::Memory)
            }
            Err(TrySendError::Full(task)) | Err(TrySendError::Closed(task)) => {
                self.persist(&task).await?;
                let overflow_len = self.overflow_len().await.unwrap_or(0);
                tracing::info!(
                    overflow_len = overflow_len,
                    "In-memory review queue full, task spilled to overflow store"
                );
                Ok(TaskSource::Overflow)
            }
        }
    }

    /// Memory first, then the oldest unclaimed overflow entry.
    ///
    /// A picture is handed to at most one holder. A memory task whose picture
    /// is already claimed or listed in the overflow store is merged into the
    /// stored copy instead of being handed out.
    pub async fn dequeue_one(&self) -> Result<Option<ClaimedTask>, AppError> {
        while let Some(task) = self.try_recv_memory() {
            if self.claim_memory(&task).await? {
                return Ok(Some(ClaimedTask {
                    task,
                    source: TaskSource::Memory,
                    entry: None,
                }));
            }
            tracing::debug!(
                picture_id = %task.picture_id,
                version = task.version,
                "Review already pending for picture, merging duplicate task"
            );
            self.persist(&task).await?;
        }

        for _ in 0..self.cas_attempts {
            let current = self.store.list_range(REVIEW_PENDING_LIST).await?;
            let held: HashSet<&str> = current
                .iter()
                .map(|raw| PendingEntry::parse(raw))
                .filter(|entry| entry.marked)
                .map(|entry| entry.id)
                .collect();
            let index = {
                let memory_claims = self.memory_claims();
                current.iter().position(|raw| {
                    let entry = PendingEntry::parse(raw);
                    !entry.marked
                        && !held.contains(entry.id)
                        && !Uuid::parse_str(entry.id)
                            .map(|id| memory_claims.contains(&id))
                            .unwrap_or(false)
                })
            };
            let Some(index) = index else {
                return Ok(None);
            };

            let id = current[index].clone();
            let entry = marked_entry(&id);
            let mut next = current.clone();
            next[index] = entry.clone();

            if !self
                .store
                .compare_and_swap_list(REVIEW_PENDING_LIST, &current, next)
                .await?
            {
                tracing::trace!(task_id = %id, "Lost claim race, retrying");
                continue;
            }

            match self.load_task(&id).await? {
                Some(task) => {
                    return Ok(Some(ClaimedTask {
                        task,
                        source: TaskSource::Overflow,
                        entry: Some(entry),
                    }))
                }
                None => {
                    tracing::warn!(task_id = %id, "Overflow entry without stored task, dropping it");
                    self.remove_entries(&id).await?;
                }
            }
        }

        tracing::warn!(
            attempts = self.cas_attempts,
            "Overflow claim contention, giving up for this tick"
        );
        Ok(None)
    }

    /// Finish a task.
    ///
    /// Drops the claim and every queued copy of the picture at the reviewed
    /// version or older. A copy queued for newer content stays listed.
    pub async fn acknowledge(&self, claimed: &ClaimedTask) -> Result<(), AppError> {
        let picture_id = claimed.task.picture_id;
        let id = picture_id.to_string();
        let redundant = self
            .stored_task(picture_id)
            .await?
            .map(|stored| stored.version <= claimed.task.version)
            .unwrap_or(true);

        let owned = claimed.entry.as_deref();
        let result = self
            .rewrite_list(|entries| {
                let before = entries.len();
                entries.retain(|raw| {
                    if owned == Some(raw.as_str()) {
                        return false;
                    }
                    let entry = PendingEntry::parse(raw);
                    !(redundant && !entry.marked && entry.id == id)
                });
                entries.len() != before
            })
            .await;
        self.release_memory_claim(claimed);
        result?;

        if redundant {
            match self.stored_task(picture_id).await? {
                // Re-queued for newer content while the list was rewritten.
                Some(stored) if stored.version > claimed.task.version => {
                    self.ensure_listed(&id).await?;
                }
                _ => {
                    self.store.delete(&review_task_key(picture_id)).await?;
                }
            }
        }

        tracing::debug!(picture_id = %picture_id, source = ?claimed.source, redundant, "Review task acknowledged");
        Ok(())
    }

    /// Return an unfinished task for a later tick, counting the cycle.
    /// Memory tasks are moved to the overflow store.
    pub async fn release(&self, claimed: ClaimedTask) -> Result<u32, AppError> {
        self.release_memory_claim(&claimed);
        let mut task = claimed.task;
        task.cycles += 1;
        let cycles = task.cycles;

        match claimed.source {
            TaskSource::Memory => self.persist(&task).await?,
            TaskSource::Overflow => {
                let id = task.picture_id.to_string();
                let superseded = self
                    .stored_task(task.picture_id)
                    .await?
                    .map(|stored| stored.version > task.version)
                    .unwrap_or(false);
                if !superseded {
                    self.store
                        .set(&review_task_key(task.picture_id), serde_json::to_string(&task)?)
                        .await?;
                }
                let owned = claimed.entry;
                self.rewrite_list(|entries| {
                    let Some(position) = entries.iter().position(|raw| match owned.as_deref() {
                        Some(entry) => raw == entry,
                        None => {
                            let parsed = PendingEntry::parse(raw);
                            parsed.marked && parsed.id == id
                        }
                    }) else {
                        return false;
                    };
                    let already_listed = entries.iter().any(|raw| {
                        let parsed = PendingEntry::parse(raw);
                        !parsed.marked && parsed.id == id
                    });
                    if already_listed {
                        entries.remove(position);
                    } else {
                        entries[position] = id.clone();
                    }
                    true
                })
                .await?;
            }
        }

        tracing::debug!(picture_id = %task.picture_id, cycles, "Review task released");
        Ok(cycles)
    }

    /// Clear claim markers older than the grace period. Returns how many
    /// entries became claimable again.
    pub async fn reclaim_stale(&self) -> Result<usize, AppError> {
        let cutoff = Utc::now().timestamp_millis() - self.stale_claim_grace.as_millis() as i64;
        let mut reclaimed = 0;

        self.rewrite_list(|entries| {
            reclaimed = 0;
            let mut next = Vec::with_capacity(entries.len());
            for raw in entries.iter() {
                let parsed = PendingEntry::parse(raw);
                let stale = parsed.marked
                    && parsed.claimed_at_millis.map(|at| at <= cutoff).unwrap_or(true);
                if !stale {
                    next.push(raw.clone());
                    continue;
                }
                reclaimed += 1;
                // An unclaimed copy already waits; the stale claim just goes.
                let listed = entries.iter().any(|other| {
                    let other = PendingEntry::parse(other);
                    !other.marked && other.id == parsed.id
                });
                if !listed {
                    next.push(parsed.id.to_string());
                }
            }
            *entries = next;
            reclaimed > 0
        })
        .await?;

        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Reclaimed stale review task claims");
        }
        Ok(reclaimed)
    }

    /// Move every in-memory task to the overflow store. Run on shutdown so
    /// queued reviews outlive the process.
    pub async fn spill_memory(&self) -> Result<usize, AppError> {
        let mut spilled = 0;
        while let Some(task) = self.try_recv_memory() {
            self.persist(&task).await?;
            spilled += 1;
        }
        if spilled > 0 {
            tracing::info!(spilled, "In-memory review tasks moved to overflow store");
        }
        Ok(spilled)
    }

    pub fn in_memory_len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    pub async fn overflow_len(&self) -> Result<usize, AppError> {
        Ok(self.store.list_range(REVIEW_PENDING_LIST).await?.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn try_recv_memory(&self) -> Option<ReviewTask> {
        let mut receiver = self.receiver.lock().unwrap_or_else(|e| e.into_inner());
        match receiver.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn memory_claims(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.memory_claims.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a memory claim unless the picture is already held or listed.
    ///
    /// The claim is recorded before the list is read, so an overflow claim
    /// racing with this one sees either the claim or the listed entry.
    async fn claim_memory(&self, task: &ReviewTask) -> Result<bool, AppError> {
        if !self.memory_claims().insert(task.picture_id) {
            return Ok(false);
        }
        let id = task.picture_id.to_string();
        let listed = self
            .store
            .list_range(REVIEW_PENDING_LIST)
            .await
            .map(|entries| entries.iter().any(|raw| PendingEntry::parse(raw).id == id));
        match listed {
            Ok(false) => Ok(true),
            Ok(true) => {
                self.memory_claims().remove(&task.picture_id);
                Ok(false)
            }
            Err(e) => {
                self.memory_claims().remove(&task.picture_id);
                Err(e.into())
            }
        }
    }

    fn release_memory_claim(&self, claimed: &ClaimedTask) {
        if claimed.source == TaskSource::Memory {
            self.memory_claims().remove(&claimed.task.picture_id);
        }
    }

    async fn stored_task(&self, picture_id: Uuid) -> Result<Option<ReviewTask>, AppError> {
        match self.store.get(&review_task_key(picture_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load_task(&self, id: &str) -> Result<Option<ReviewTask>, AppError> {
        let Ok(picture_id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        self.stored_task(picture_id).await
    }

    /// Store the task unless newer content is already queued, and make sure
    /// its id is listed once without a claim marker.
    async fn persist(&self, task: &ReviewTask) -> Result<(), AppError> {
        let newer_stored = self
            .stored_task(task.picture_id)
            .await?
            .map(|stored| stored.version > task.version)
            .unwrap_or(false);
        if !newer_stored {
            self.store
                .set(&review_task_key(task.picture_id), serde_json::to_string(task)?)
                .await?;
        }
        self.ensure_listed(&task.picture_id.to_string()).await
    }

    async fn ensure_listed(&self, id: &str) -> Result<(), AppError> {
        self.rewrite_list(|entries| {
            let listed = entries.iter().any(|raw| {
                let parsed = PendingEntry::parse(raw);
                !parsed.marked && parsed.id == id
            });
            if listed {
                return false;
            }
            entries.push(id.to_string());
            true
        })
        .await
    }

    async fn remove_entries(&self, id: &str) -> Result<(), AppError> {
        self.rewrite_list(|entries| {
            let before = entries.len();
            entries.retain(|raw| PendingEntry::parse(raw).id != id);
            entries.len() != before
        })
        .await
    }

    /// Read-modify-CAS loop over the pending list. `edit` returns whether it
    /// changed anything; unchanged lists are not written.
    async fn rewrite_list(
        &self,
        mut edit: impl FnMut(&mut Vec<String>) -> bool + Send,
    ) -> Result<(), AppError> {
        for _ in 0..self.cas_attempts {
            let current = self.store.list_range(REVIEW_PENDING_LIST).await?;
            let mut next = current.clone();
            if !edit(&mut next) {
                return Ok(());
            }
            if self
                .store
                .compare_and_swap_list(REVIEW_PENDING_LIST, &current, next)
                .await?
            {
                return Ok(());
            }
        }
        Err(AppError::Conflict(format!(
            "Could not update '{}' after {} attempts",
            REVIEW_PENDING_LIST, self.cas_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overflow::MemoryOverflowStore;

    fn queue(capacity: usize, store: MemoryOverflowStore) -> ReviewQueue {
        ReviewQueue::new(
            &ReviewQueueConfig {
                capacity,
                ..ReviewQueueConfig::default()
            },
            Arc::new(store),
        )
    }

    #[test]
    fn test_pending_entry_parse() {
        assert_eq!(
            PendingEntry::parse("abc|processing|42"),
            PendingEntry {
                id: "abc",
                claimed_at_millis: Some(42),
                marked: true
            }
        );
        assert!(!PendingEntry::parse("abc").marked);
        assert!(PendingEntry::parse("abc|processing|garbage").marked);
    }

    #[tokio::test]
    async fn test_overflow_after_capacity() {
        let q = queue(2, MemoryOverflowStore::new());
        for _ in 0..3 {
            q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1))
                .await
                .unwrap();
        }
        assert_eq!(q.in_memory_len(), 2);
        assert_eq!(q.overflow_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claimed_overflow_entry_is_not_handed_out_twice() {
        let q = queue(1, MemoryOverflowStore::new());
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        let spilled = ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        q.enqueue(spilled.clone()).await.unwrap();

        let first = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(first.source, TaskSource::Memory);
        let second = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(second.source, TaskSource::Overflow);
        assert_eq!(second.task, spilled);
        assert!(q.dequeue_one().await.unwrap().is_none());

        q.acknowledge(&second).await.unwrap();
        assert_eq!(q.overflow_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_increments_cycles_and_requeues() {
        let store = MemoryOverflowStore::new();
        let q = queue(4, store.clone());
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();

        let claimed = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(q.release(claimed).await.unwrap(), 1);

        let again = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(again.source, TaskSource::Overflow);
        assert_eq!(again.task.cycles, 1);
        assert_eq!(q.release(again).await.unwrap(), 2);

        let third = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(third.task.cycles, 2);
        assert_eq!(store.list_range(REVIEW_PENDING_LIST).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reclaim_stale_claims() {
        let store = MemoryOverflowStore::new();
        let q = ReviewQueue::new(
            &ReviewQueueConfig {
                capacity: 1,
                stale_claim_grace_secs: 0,
                ..ReviewQueueConfig::default()
            },
            Arc::new(store.clone()),
        );
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        let _memory = q.dequeue_one().await.unwrap().unwrap();
        let crashed = q.dequeue_one().await.unwrap().unwrap();
        assert!(q.dequeue_one().await.unwrap().is_none());

        assert_eq!(q.reclaim_stale().await.unwrap(), 1);
        let recovered = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(recovered.task, crashed.task);
    }

    #[tokio::test]
    async fn test_claim_retries_lost_swaps() {
        let store = MemoryOverflowStore::new();
        let q = queue(1, store.clone());
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        q.dequeue_one().await.unwrap().unwrap();

        store.fail_next_swaps(3);
        let claimed = q.dequeue_one().await.unwrap();
        assert!(claimed.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_spill_is_listed_once() {
        let q = queue(1, MemoryOverflowStore::new());
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        let task = ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        q.enqueue(task.clone()).await.unwrap();
        q.enqueue(task).await.unwrap();
        assert_eq!(q.overflow_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_spill_memory_moves_queued_tasks() {
        let q = queue(4, MemoryOverflowStore::new());
        for _ in 0..3 {
            q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        }

        assert_eq!(q.spill_memory().await.unwrap(), 3);
        assert_eq!(q.in_memory_len(), 0);
        assert_eq!(q.overflow_len().await.unwrap(), 3);

        let claimed = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(claimed.source, TaskSource::Overflow);
    }

    #[tokio::test]
    async fn test_requeued_spilled_task_has_one_holder() {
        let q = queue(1, MemoryOverflowStore::new());
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        let task = ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        assert_eq!(q.enqueue(task.clone()).await.unwrap(), TaskSource::Overflow);

        let other = q.dequeue_one().await.unwrap().unwrap();
        q.acknowledge(&other).await.unwrap();
        assert_eq!(q.enqueue(task.clone()).await.unwrap(), TaskSource::Memory);

        let claimed = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(claimed.task, task);
        assert_eq!(claimed.source, TaskSource::Overflow);
        assert!(q.dequeue_one().await.unwrap().is_none());
        assert_eq!(q.in_memory_len(), 0);

        q.acknowledge(&claimed).await.unwrap();
        assert_eq!(q.overflow_len().await.unwrap(), 0);
        assert!(q.dequeue_one().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_acknowledge_drops_spilled_copy() {
        let store = MemoryOverflowStore::new();
        let q = queue(1, store.clone());
        let task = ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1);
        q.enqueue(task.clone()).await.unwrap();
        let held = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(held.source, TaskSource::Memory);

        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        assert_eq!(q.enqueue(task.clone()).await.unwrap(), TaskSource::Overflow);

        let other = q.dequeue_one().await.unwrap().unwrap();
        assert_ne!(other.picture_id(), task.picture_id);
        // The spilled copy waits while the memory claim is held.
        assert!(q.dequeue_one().await.unwrap().is_none());

        q.acknowledge(&held).await.unwrap();
        assert_eq!(q.overflow_len().await.unwrap(), 0);
        assert!(store
            .get(&review_task_key(task.picture_id))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_acknowledge_keeps_copy_for_newer_content() {
        let q = queue(1, MemoryOverflowStore::new());
        let picture_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        q.enqueue(ReviewTask::new(picture_id, owner_id, 1)).await.unwrap();
        let held = q.dequeue_one().await.unwrap().unwrap();

        q.enqueue(ReviewTask::new(Uuid::new_v4(), owner_id, 1)).await.unwrap();
        q.enqueue(ReviewTask::new(picture_id, owner_id, 2)).await.unwrap();
        q.acknowledge(&held).await.unwrap();

        let other = q.dequeue_one().await.unwrap().unwrap();
        assert_ne!(other.picture_id(), picture_id);
        let newer = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(newer.picture_id(), picture_id);
        assert_eq!(newer.task.version, 2);
    }

    #[tokio::test]
    async fn test_spill_keeps_newest_version() {
        let q = queue(1, MemoryOverflowStore::new());
        let picture_id = Uuid::new_v4();
        q.enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();
        q.enqueue(ReviewTask::new(picture_id, Uuid::new_v4(), 3)).await.unwrap();
        q.enqueue(ReviewTask::new(picture_id, Uuid::new_v4(), 2)).await.unwrap();
        assert_eq!(q.overflow_len().await.unwrap(), 1);

        q.dequeue_one().await.unwrap().unwrap();
        let claimed = q.dequeue_one().await.unwrap().unwrap();
        assert_eq!(claimed.task.version, 3);
    }

    #[tokio::test]
    async fn test_reclaim_drops_stale_claim_with_waiting_copy() {
        let store = MemoryOverflowStore::new();
        let q = ReviewQueue::new(
            &ReviewQueueConfig {
                capacity: 1,
                stale_claim_grace_secs: 0,
                ..ReviewQueueConfig::default()
            },
            Arc::new(store.clone()),
        );
        let id = Uuid::new_v4().to_string();
        store
            .compare_and_swap_list(REVIEW_PENDING_LIST, &[], vec![marked_entry(&id), id.clone()])
            .await
            .unwrap();

        assert_eq!(q.reclaim_stale().await.unwrap(), 1);
        assert_eq!(store.list_range(REVIEW_PENDING_LIST).await.unwrap(), vec![id]);
    }
}
