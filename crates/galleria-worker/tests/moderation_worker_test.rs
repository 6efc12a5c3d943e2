mod helpers;

use std::time::Duration;

use galleria_core::constants::picture_detail_cache_key;
use galleria_core::{ModerationStatus, ReviewDecision, ReviewTask};
use galleria_db::PictureRepository;
use galleria_storage::Storage;
use galleria_worker::{NotificationKind, PollSettings, ReviewOutcome, RiskLevel, TaskSource};
use helpers::{label, worker_fixture, FixtureOptions, GatedModeration, ScriptedModeration};
use uuid::Uuid;

async fn run_one_tick(fixture: &helpers::WorkerFixture) -> ReviewOutcome {
    let handle = fixture
        .worker
        .tick()
        .await
        .expect("a task should have been claimed");
    handle.await.unwrap()
}

#[tokio::test]
async fn test_label_below_deny_list_threshold_is_approved_with_advisory() {
    let service = ScriptedModeration::verdict(
        RiskLevel::Medium,
        vec![label("violent_gunKnives", 85.0)],
    );
    let fixture = worker_fixture(service.clone(), FixtureOptions::default());
    let asset = fixture.seed_pending().await;

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Approved);

    let stored = fixture.status_of(asset.id).await;
    assert_eq!(stored.moderation_status, ModerationStatus::Approved);
    assert!(stored.reviewed_at.is_some());
    assert!(stored
        .moderation_message
        .as_deref()
        .unwrap()
        .contains("85.0 < 100.0"));

    let sent = fixture.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Approved);
    assert_eq!(sent[0].owner_id, asset.owner_id);
    assert_eq!(service.created(), 1);

    assert_eq!(fixture.queue.in_memory_len(), 0);
    assert_eq!(fixture.queue.overflow_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_label_over_threshold_is_rejected() {
    let service = ScriptedModeration::verdict(RiskLevel::High, vec![label("porn", 97.5)]);
    let fixture = worker_fixture(service, FixtureOptions::default());
    let asset = fixture.seed_pending().await;

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Rejected);

    let stored = fixture.status_of(asset.id).await;
    assert_eq!(stored.moderation_status, ModerationStatus::Rejected);
    assert!(stored.moderation_message.unwrap().contains("porn"));
    assert_eq!(fixture.sink.sent()[0].kind, NotificationKind::Rejected);
}

#[tokio::test]
async fn test_exhausted_poll_releases_task_and_keeps_pending() {
    let service = ScriptedModeration::always_processing();
    let fixture = worker_fixture(service, FixtureOptions::default());
    let asset = fixture.seed_pending().await;

    assert_eq!(
        run_one_tick(&fixture).await,
        ReviewOutcome::Released { cycles: 1 }
    );

    let stored = fixture.status_of(asset.id).await;
    assert_eq!(stored.moderation_status, ModerationStatus::Pending);
    assert!(fixture.sink.sent().is_empty());

    let again = fixture.queue.dequeue_one().await.unwrap().unwrap();
    assert_eq!(again.picture_id(), asset.id);
    assert_eq!(again.task.cycles, 1);
    assert_eq!(again.source, TaskSource::Overflow);
}

#[tokio::test]
async fn test_failed_moderation_task_is_retried() {
    let service = ScriptedModeration::failing("image unreachable");
    let fixture = worker_fixture(service, FixtureOptions::default());
    fixture.seed_pending().await;

    assert_eq!(
        run_one_tick(&fixture).await,
        ReviewOutcome::Released { cycles: 1 }
    );
    assert_eq!(fixture.queue.overflow_len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_escalates_after_max_review_cycles() {
    let service = ScriptedModeration::always_processing();
    let fixture = worker_fixture(
        service,
        FixtureOptions {
            max_review_cycles: 2,
            ..FixtureOptions::default()
        },
    );
    let asset = fixture.seed_pending().await;

    assert_eq!(
        run_one_tick(&fixture).await,
        ReviewOutcome::Released { cycles: 1 }
    );
    assert_eq!(
        run_one_tick(&fixture).await,
        ReviewOutcome::Released { cycles: 2 }
    );
    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Escalated);

    let stored = fixture.status_of(asset.id).await;
    assert_eq!(stored.moderation_status, ModerationStatus::Pending);
    assert_eq!(
        stored.moderation_message.as_deref(),
        Some("escalated to manual review")
    );

    let sent = fixture.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::EscalatedToManualReview);

    assert!(fixture.worker.tick().await.is_none());
    assert_eq!(fixture.queue.overflow_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_picture_is_dropped() {
    let service = ScriptedModeration::verdict(RiskLevel::None, vec![]);
    let fixture = worker_fixture(service.clone(), FixtureOptions::default());
    fixture
        .queue
        .enqueue(ReviewTask::new(Uuid::new_v4(), Uuid::new_v4(), 1))
        .await
        .unwrap();

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Dropped);
    assert_eq!(service.created(), 0);
    assert!(fixture.worker.tick().await.is_none());
}

#[tokio::test]
async fn test_already_reviewed_picture_is_not_notified_again() {
    let service = ScriptedModeration::verdict(RiskLevel::High, vec![label("porn", 99.0)]);
    let fixture = worker_fixture(service.clone(), FixtureOptions::default());
    let asset = fixture.seed_pending().await;

    fixture
        .repository
        .apply_review(asset.id, asset.version, &ReviewDecision::approved(None))
        .await
        .unwrap();

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::AlreadyTerminal);
    assert_eq!(service.created(), 0);
    assert!(fixture.sink.sent().is_empty());
    assert_eq!(
        fixture.status_of(asset.id).await.moderation_status,
        ModerationStatus::Approved
    );
}

#[tokio::test]
async fn test_duplicate_tasks_apply_once() {
    let service = ScriptedModeration::verdict(RiskLevel::None, vec![]);
    let fixture = worker_fixture(service, FixtureOptions::default());
    let asset = fixture.seed_pending().await;
    fixture
        .queue
        .enqueue(ReviewTask::for_asset(&asset))
        .await
        .unwrap();

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Approved);
    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::AlreadyTerminal);
    assert_eq!(fixture.sink.sent().len(), 1);
}

#[tokio::test]
async fn test_content_replaced_during_review_is_not_approved() {
    let service = GatedModeration::verdict(RiskLevel::None, vec![]);
    let fixture = worker_fixture(service.clone(), FixtureOptions::default());
    let asset = fixture.seed_pending().await;

    let running = fixture.worker.tick().await.expect("task claimed");
    service.query_started().await;

    // Edit the picture while the verdict for the old content is in flight.
    let mut edited = asset.clone();
    edited.default.storage_path = format!("public/{}/{}_edited.webp", asset.owner_id, asset.id);
    fixture
        .storage
        .put(
            &edited.default.storage_path,
            bytes::Bytes::from_static(b"edited"),
            "image/webp",
        )
        .await
        .unwrap();
    let edited = fixture
        .repository
        .replace_content(&edited, asset.version)
        .await
        .unwrap();
    fixture
        .queue
        .enqueue(ReviewTask::for_asset(&edited))
        .await
        .unwrap();

    service.open();
    assert_eq!(running.await.unwrap(), ReviewOutcome::Superseded);

    let stored = fixture.status_of(asset.id).await;
    assert_eq!(stored.moderation_status, ModerationStatus::Pending);
    assert!(stored.reviewed_at.is_none());
    assert!(fixture.sink.sent().is_empty());

    // The edited content gets its own review.
    service.open();
    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Approved);

    let submitted = service.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[1].contains("_edited.webp"));

    let stored = fixture.status_of(asset.id).await;
    assert_eq!(stored.version, edited.version);
    assert_eq!(stored.moderation_status, ModerationStatus::Approved);
    assert_eq!(fixture.sink.sent().len(), 1);
    assert!(fixture.worker.tick().await.is_none());
}

#[tokio::test]
async fn test_task_for_older_version_skips_moderation() {
    let service = ScriptedModeration::verdict(RiskLevel::None, vec![]);
    let fixture = worker_fixture(service.clone(), FixtureOptions::default());
    let asset = fixture.seed_pending().await;
    fixture
        .repository
        .replace_content(&asset, asset.version)
        .await
        .unwrap();

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Superseded);
    assert_eq!(service.created(), 0);
    assert_eq!(
        fixture.status_of(asset.id).await.moderation_status,
        ModerationStatus::Pending
    );
}

#[tokio::test]
async fn test_terminal_decision_invalidates_cached_detail() {
    let service = ScriptedModeration::verdict(RiskLevel::None, vec![]);
    let fixture = worker_fixture(service, FixtureOptions::default());
    let asset = fixture.seed_pending().await;

    let detail_key = picture_detail_cache_key(asset.id);
    fixture.cache.set(&detail_key, &asset).await.unwrap();

    assert_eq!(run_one_tick(&fixture).await, ReviewOutcome::Approved);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(fixture
        .cache
        .get::<galleria_core::PictureAsset>(&detail_key)
        .await
        .is_none());
}

#[tokio::test]
async fn test_busy_pool_skips_claim() {
    let service = ScriptedModeration::always_processing();
    let fixture = worker_fixture(
        service,
        FixtureOptions {
            pool_workers: 1,
            poll: PollSettings {
                interval: Duration::from_millis(20),
                max_attempts: 50,
                deadline: Duration::from_secs(5),
            },
            ..FixtureOptions::default()
        },
    );
    fixture.seed_pending().await;
    fixture.seed_pending().await;

    let running = fixture.worker.tick().await.expect("first task claimed");
    assert!(fixture.worker.tick().await.is_none());
    assert_eq!(fixture.queue.in_memory_len(), 1);

    fixture.worker.shutdown().await;
    assert_eq!(running.await.unwrap(), ReviewOutcome::Released { cycles: 1 });
}

#[tokio::test]
async fn test_scheduler_drains_queue() {
    let service = ScriptedModeration::verdict(RiskLevel::None, vec![]);
    let fixture = worker_fixture(service, FixtureOptions::default());
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(fixture.seed_pending().await.id);
    }

    let scheduler = fixture.worker.clone().start();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut approved = 0;
        for id in &ids {
            if fixture.status_of(*id).await.moderation_status == ModerationStatus::Approved {
                approved += 1;
            }
        }
        if approved == ids.len() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "queue was not drained");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fixture.worker.shutdown().await;
    scheduler.await.unwrap();
    assert_eq!(fixture.sink.sent().len(), 5);
}
