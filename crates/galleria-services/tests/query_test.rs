mod helpers;

use std::time::Duration;

use galleria_core::{AppError, ModerationStatus, PictureQuery, ReviewDecision};
use galleria_db::PictureRepository;
use galleria_services::IngestRequest;
use helpers::{ingest_fixture, png};
use uuid::Uuid;

#[tokio::test]
async fn test_public_gallery_lists_only_approved_pictures() {
    let fixture = ingest_fixture(0);
    let owner = Uuid::new_v4();

    let mut trusted = IngestRequest::from_bytes(owner, "a.png", "image/png", png(32, 32, 1));
    trusted.trusted = true;
    let approved = fixture.coordinator.ingest(trusted).await.unwrap().asset;

    let pending = fixture
        .coordinator
        .ingest(IngestRequest::from_bytes(owner, "b.png", "image/png", png(32, 32, 2)))
        .await
        .unwrap()
        .asset;

    let gallery = fixture.query.public_gallery(20, 0).await.unwrap();
    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery[0].id, approved.id);

    let pending_only = fixture
        .query
        .list(PictureQuery {
            owner_id: Some(owner),
            status: Some(ModerationStatus::Pending),
            ..PictureQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(pending_only.len(), 1);
    assert_eq!(pending_only[0].id, pending.id);
}

#[tokio::test]
async fn test_detail_is_served_from_cache_until_invalidated() {
    let fixture = ingest_fixture(0);
    let asset = fixture
        .coordinator
        .ingest(IngestRequest::from_bytes(
            Uuid::new_v4(),
            "c.png",
            "image/png",
            png(32, 32, 3),
        ))
        .await
        .unwrap()
        .asset;
    // Let the ingest's delayed deletes finish first.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cached = fixture.query.get(asset.id).await.unwrap();
    assert_eq!(cached.moderation_status, ModerationStatus::Pending);

    // A write that bypasses invalidation is not visible through the cache.
    fixture
        .repository
        .apply_review(asset.id, asset.version, &ReviewDecision::approved(None))
        .await
        .unwrap();
    assert_eq!(
        fixture.query.get(asset.id).await.unwrap().moderation_status,
        ModerationStatus::Pending
    );

    let report = fixture
        .cache
        .invalidate(&galleria_core::constants::picture_detail_cache_key(asset.id))
        .await
        .wait()
        .await;
    assert!(report.cleared);
    assert_eq!(
        fixture.query.get(asset.id).await.unwrap().moderation_status,
        ModerationStatus::Approved
    );
}

#[tokio::test]
async fn test_missing_picture_is_not_found_and_not_cached() {
    let fixture = ingest_fixture(0);
    let id = Uuid::new_v4();
    assert!(matches!(
        fixture.query.get(id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        fixture.query.get(id).await,
        Err(AppError::NotFound(_))
    ));
}
