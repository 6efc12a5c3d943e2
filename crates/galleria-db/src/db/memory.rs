use std::collections::HashMap;

use galleria_core::{AppError, ModerationStatus, PictureAsset, PictureQuery, ReviewDecision};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::picture::{PictureRepository, ReviewApplied};

/// Process-local repository. Every operation takes the map lock once, so the
/// conditional updates are atomic with respect to each other.
#[derive(Default)]
pub struct InMemoryPictureRepository {
    pictures: RwLock<HashMap<Uuid, PictureAsset>>,
}

impl InMemoryPictureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.pictures.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl PictureRepository for InMemoryPictureRepository {
    async fn insert(&self, asset: &PictureAsset) -> Result<PictureAsset, AppError> {
        let mut pictures = self.pictures.write().await;
        if pictures.contains_key(&asset.id) {
            return Err(AppError::Conflict(format!(
                "Picture {} already exists",
                asset.id
            )));
        }
        pictures.insert(asset.id, asset.clone());
        Ok(asset.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PictureAsset>, AppError> {
        Ok(self.pictures.read().await.get(&id).cloned())
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<PictureAsset>, AppError> {
        let pictures = self.pictures.read().await;
        Ok(pictures
            .values()
            .filter(|p| p.content_hash == content_hash)
            .min_by_key(|p| (p.created_at, p.id))
            .cloned())
    }

    async fn replace_content(
        &self,
        asset: &PictureAsset,
        expected_version: i64,
    ) -> Result<PictureAsset, AppError> {
        let mut pictures = self.pictures.write().await;
        let stored = pictures
            .get_mut(&asset.id)
            .ok_or_else(|| AppError::NotFound(format!("Picture {} not found", asset.id)))?;

        if stored.version != expected_version {
            return Err(AppError::Conflict(format!(
                "Picture {} was modified concurrently (expected version {}, found {})",
                asset.id, expected_version, stored.version
            )));
        }

        let mut updated = asset.clone();
        updated.created_at = stored.created_at;
        updated.version = stored.version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn apply_review(
        &self,
        id: Uuid,
        version: i64,
        decision: &ReviewDecision,
    ) -> Result<ReviewApplied, AppError> {
        let mut pictures = self.pictures.write().await;
        let stored = pictures
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Picture {} not found", id)))?;

        if stored.version != version {
            return Ok(ReviewApplied::Superseded {
                current_version: stored.version,
            });
        }
        if !stored.moderation_status.can_transition_to(decision.status) {
            return Ok(ReviewApplied::AlreadyTerminal(stored.moderation_status));
        }

        stored.moderation_status = decision.status;
        stored.moderation_message = decision.message.clone();
        stored.reviewer_id = decision.reviewer_id;
        stored.reviewed_at = Some(decision.reviewed_at);
        Ok(ReviewApplied::Applied)
    }

    async fn escalate(
        &self,
        id: Uuid,
        version: i64,
        message: &str,
    ) -> Result<ReviewApplied, AppError> {
        let mut pictures = self.pictures.write().await;
        let stored = pictures
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Picture {} not found", id)))?;

        if stored.version != version {
            return Ok(ReviewApplied::Superseded {
                current_version: stored.version,
            });
        }
        if stored.moderation_status != ModerationStatus::Pending {
            return Ok(ReviewApplied::AlreadyTerminal(stored.moderation_status));
        }
        stored.moderation_message = Some(message.to_string());
        Ok(ReviewApplied::Applied)
    }

    async fn list(&self, query: &PictureQuery) -> Result<Vec<PictureAsset>, AppError> {
        let pictures = self.pictures.read().await;
        let mut matching: Vec<&PictureAsset> =
            pictures.values().filter(|p| query.matches(p)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
