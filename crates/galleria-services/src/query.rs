use std::sync::Arc;

use galleria_cache::{picture_list_key, CacheLayer};
use galleria_core::constants::picture_detail_cache_key;
use galleria_core::{AppError, PictureAsset, PictureQuery};
use galleria_db::PictureRepository;
use uuid::Uuid;

/// Read-through picture lookups over the two-tier cache.
#[derive(Clone)]
pub struct PictureQueryService {
    repository: Arc<dyn PictureRepository>,
    cache: CacheLayer,
}

impl PictureQueryService {
    pub fn new(repository: Arc<dyn PictureRepository>, cache: CacheLayer) -> Self {
        Self { repository, cache }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, query: PictureQuery) -> Result<Vec<PictureAsset>, AppError> {
        let query = query.normalized();
        let key = picture_list_key(&query)?;
        let repository = self.repository.clone();
        self.cache
            .get_or_load(&key, || async move { repository.list(&query).await })
            .await
    }

    /// Approved pictures outside of spaces, newest first.
    pub async fn public_gallery(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PictureAsset>, AppError> {
        self.list(PictureQuery {
            limit,
            offset,
            ..PictureQuery::public_gallery()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<PictureAsset, AppError> {
        let repository = self.repository.clone();
        self.cache
            .get_or_load(&picture_detail_cache_key(id), || async move {
                repository
                    .get(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Picture {} not found", id)))
            })
            .await
    }
}
