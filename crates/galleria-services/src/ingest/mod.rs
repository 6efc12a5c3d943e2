//! Upload ingestion
//!
//! One upload flows: validate → hash → (content-hash lock) dedup lookup →
//! decode → derivative fan-out on the ingestion pool → dominant color →
//! persist → enqueue for review → cache invalidation.

mod fanout;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use galleria_cache::CacheLayer;
use galleria_core::constants::{picture_detail_cache_key, PICTURE_LIST_CACHE_PREFIX};
use galleria_core::models::picture::aspect_ratio;
use galleria_core::{
    AppError, Derivative, DerivativeKind, DominantColor, IngestConfig, ModerationStatus,
    PictureAsset, ReviewTask,
};
use galleria_db::PictureRepository;
use galleria_infra::{KeyedLocks, WorkerPool};
use galleria_processing::{
    content_hash, decode_image, probe_image, ColorExtractor, DerivativeGenerator,
    DerivativeNamer, ImageProbe, PictureValidator, ProcessingError,
};
use galleria_storage::{Storage, StorageScope};
use galleria_worker::{ReviewQueue, TaskSource};
use uuid::Uuid;

use crate::remote::RemoteFetcher;
use fanout::{join_units, DerivativeUnit, StoredUnit};

#[derive(Debug, Clone)]
pub enum IngestSource {
    Bytes(Bytes),
    RemoteUrl(String),
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source: IngestSource,
    pub filename: String,
    /// Declared content type. For remote sources the server's header wins.
    pub content_type: String,
    pub owner_id: Uuid,
    /// Replace the content of this existing picture instead of creating one.
    pub target_id: Option<Uuid>,
    pub space_id: Option<Uuid>,
    pub name: Option<String>,
    /// Skip automated review.
    pub trusted: bool,
}

impl IngestRequest {
    pub fn from_bytes(
        owner_id: Uuid,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            source: IngestSource::Bytes(bytes.into()),
            filename: filename.into(),
            content_type: content_type.into(),
            owner_id,
            target_id: None,
            space_id: None,
            name: None,
            trusted: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub asset: PictureAsset,
    /// Derivatives were reused from an existing picture with the same bytes.
    pub deduplicated: bool,
    /// Where the review task went; `None` for trusted uploads.
    pub queued: Option<TaskSource>,
}

/// Derivatives and the metadata derived from them.
#[derive(Debug, Clone)]
struct StoredContent {
    thumbnail: Derivative,
    default: Derivative,
    original: Derivative,
    size_bytes: i64,
    width: u32,
    height: u32,
    format: String,
    dominant_color: Option<DominantColor>,
}

impl StoredContent {
    fn reused(existing: &PictureAsset) -> Self {
        Self {
            thumbnail: existing.thumbnail.clone(),
            default: existing.default.clone(),
            original: existing.original.clone(),
            size_bytes: existing.size_bytes,
            width: existing.width,
            height: existing.height,
            format: existing.format.clone(),
            dominant_color: existing.dominant_color,
        }
    }

    fn storage_paths(&self) -> [&str; 3] {
        [
            self.thumbnail.storage_path.as_str(),
            self.default.storage_path.as_str(),
            self.original.storage_path.as_str(),
        ]
    }
}

pub struct IngestionCoordinator {
    validator: PictureValidator,
    generator: DerivativeGenerator,
    colors: ColorExtractor,
    storage: Arc<dyn Storage>,
    repository: Arc<dyn PictureRepository>,
    queue: Arc<ReviewQueue>,
    cache: CacheLayer,
    pool: WorkerPool,
    fetcher: Option<RemoteFetcher>,
    content_locks: KeyedLocks<String>,
    edit_locks: KeyedLocks<Uuid>,
    unit_retries: u32,
}

impl IngestionCoordinator {
    pub fn new(
        config: &IngestConfig,
        generator: DerivativeGenerator,
        storage: Arc<dyn Storage>,
        repository: Arc<dyn PictureRepository>,
        queue: Arc<ReviewQueue>,
        cache: CacheLayer,
        pool: WorkerPool,
    ) -> Self {
        Self {
            validator: PictureValidator::from_config(config),
            generator,
            colors: ColorExtractor::default(),
            storage,
            repository,
            queue,
            cache,
            pool,
            fetcher: None,
            content_locks: KeyedLocks::new("content-hash"),
            edit_locks: KeyedLocks::new("edit-target"),
            unit_retries: config.unit_retries,
        }
    }

    /// Enable `IngestSource::RemoteUrl`.
    pub fn with_remote_fetcher(mut self, fetcher: RemoteFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[tracing::instrument(
        skip(self, request),
        fields(owner_id = %request.owner_id, filename = %request.filename, target_id = ?request.target_id)
    )]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, AppError> {
        let start = Instant::now();
        let IngestRequest {
            source,
            filename,
            content_type,
            owner_id,
            target_id,
            space_id,
            name,
            trusted,
        } = request;

        let (bytes, content_type) = self.resolve_source(source, content_type).await?;
        let probe = self.validate(&filename, &content_type, &bytes)?;

        // Held until the new content is persisted; a concurrent edit loses.
        let _edit_guard = match target_id {
            Some(id) => Some(self.edit_locks.try_lock(id).ok_or_else(|| {
                AppError::Conflict(format!("Picture {} is already being edited", id))
            })?),
            None => None,
        };
        let target = match target_id {
            Some(id) => Some(self.load_target(id, owner_id).await?),
            None => None,
        };
        let space_id = target.as_ref().map_or(space_id, |t| t.space_id);

        let hash = content_hash(&bytes);
        let _content_guard = self.content_locks.lock(hash.clone()).await;

        let (content, deduplicated) = match self.repository.find_by_content_hash(&hash).await? {
            Some(existing) => {
                tracing::info!(
                    content_hash = %hash,
                    existing_id = %existing.id,
                    "Identical content already stored, reusing derivatives"
                );
                (StoredContent::reused(&existing), true)
            }
            None => {
                let scope = StorageScope::for_picture(owner_id, space_id);
                let content = self.store_content(bytes, &filename, scope, probe).await?;
                (content, false)
            }
        };

        let status = if trusted {
            ModerationStatus::Approved
        } else {
            ModerationStatus::Pending
        };
        let persisted = match target {
            Some(current) => {
                self.replace(current, &content, &hash, &filename, name, status)
                    .await
            }
            None => {
                self.create(owner_id, space_id, &content, &hash, &filename, name, status)
                    .await
            }
        };
        let asset = match persisted {
            Ok(asset) => asset,
            Err(e) => {
                if !deduplicated {
                    self.remove_paths(&content.storage_paths()).await;
                }
                return Err(e);
            }
        };

        let queued = if asset.moderation_status == ModerationStatus::Pending {
            Some(self.queue.enqueue(ReviewTask::for_asset(&asset)).await?)
        } else {
            None
        };

        self.invalidate(asset.id).await;

        tracing::info!(
            picture_id = %asset.id,
            content_hash = %hash,
            deduplicated,
            status = %asset.moderation_status,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Picture ingested"
        );

        Ok(IngestOutcome {
            asset,
            deduplicated,
            queued,
        })
    }

    async fn resolve_source(
        &self,
        source: IngestSource,
        declared_content_type: String,
    ) -> Result<(Bytes, String), AppError> {
        match source {
            IngestSource::Bytes(bytes) => Ok((bytes, declared_content_type)),
            IngestSource::RemoteUrl(url) => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    AppError::Validation("Remote URL ingestion is disabled".to_string())
                })?;
                let resource = fetcher.fetch(&url).await?;
                let content_type = resource.content_type.unwrap_or(declared_content_type);
                Ok((resource.bytes, content_type))
            }
        }
    }

    fn validate(
        &self,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ImageProbe, AppError> {
        self.validator
            .validate_submission(filename, content_type, bytes.len())
            .map_err(ProcessingError::from)?;
        let probe = probe_image(bytes)?;
        self.validator
            .validate_dimensions(probe.width, probe.height)
            .map_err(ProcessingError::from)?;
        Ok(probe)
    }

    async fn load_target(&self, id: Uuid, owner_id: Uuid) -> Result<PictureAsset, AppError> {
        match self.repository.get(id).await? {
            Some(asset) if asset.owner_id == owner_id => Ok(asset),
            _ => Err(AppError::NotFound(format!("Picture {} not found", id))),
        }
    }

    async fn store_content(
        &self,
        bytes: Bytes,
        filename: &str,
        scope: StorageScope,
        probe: ImageProbe,
    ) -> Result<StoredContent, AppError> {
        let source = Arc::new(self.run_blocking(move || decode_image(bytes)).await??);
        let namer = DerivativeNamer::new(Utc::now(), filename);

        let mut handles = Vec::with_capacity(DerivativeKind::ALL.len());
        let mut rejected = None;
        for kind in DerivativeKind::ALL {
            let unit = DerivativeUnit {
                kind,
                source: source.clone(),
                generator: self.generator.clone(),
                storage: self.storage.clone(),
                namer: namer.clone(),
                scope,
                retries: self.unit_retries,
            };
            match self.pool.submit(unit.run()).await {
                Ok(handle) => handles.push((kind, handle)),
                Err(e) => {
                    rejected = Some(e);
                    break;
                }
            }
        }

        let mut fan_out = join_units(handles).await;
        if let Some(e) = rejected {
            self.remove_units(&fan_out.stored).await;
            return Err(e.into());
        }
        if !fan_out.failed.is_empty() {
            let error = fan_out.failure_error();
            tracing::error!(error = %error, "Derivative fan-out failed");
            self.remove_units(&fan_out.stored).await;
            return Err(error);
        }

        let (Some(thumbnail), Some(default), Some(original)) = (
            fan_out.take(DerivativeKind::Thumbnail),
            fan_out.take(DerivativeKind::Default),
            fan_out.take(DerivativeKind::Original),
        ) else {
            return Err(AppError::Internal(
                "Derivative fan-out returned an incomplete set".to_string(),
            ));
        };

        let dominant_color = self.extract_color(thumbnail.bytes.clone()).await;

        Ok(StoredContent {
            thumbnail: thumbnail.derivative,
            default: default.derivative,
            original: original.derivative,
            size_bytes: source.size_bytes() as i64,
            width: probe.width,
            height: probe.height,
            format: probe.format,
            dominant_color,
        })
    }

    /// Color extraction never fails an upload.
    async fn extract_color(&self, thumbnail: Bytes) -> Option<DominantColor> {
        let colors = self.colors.clone();
        match self
            .run_blocking(move || colors.extract_from_bytes(&thumbnail))
            .await
        {
            Ok(Ok(color)) => color,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Dominant color extraction failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dominant color extraction could not run");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        owner_id: Uuid,
        space_id: Option<Uuid>,
        content: &StoredContent,
        hash: &str,
        filename: &str,
        name: Option<String>,
        status: ModerationStatus,
    ) -> Result<PictureAsset, AppError> {
        let now = Utc::now();
        let mut asset = PictureAsset {
            id: Uuid::new_v4(),
            owner_id,
            space_id,
            name: display_name(name, filename),
            original_filename: filename.to_string(),
            content_hash: hash.to_string(),
            thumbnail: content.thumbnail.clone(),
            default: content.default.clone(),
            original: content.original.clone(),
            size_bytes: content.size_bytes,
            width: content.width,
            height: content.height,
            aspect_ratio: aspect_ratio(content.width, content.height),
            format: content.format.clone(),
            dominant_color: content.dominant_color,
            moderation_status: ModerationStatus::Pending,
            moderation_message: None,
            reviewer_id: None,
            created_at: now,
            edited_at: now,
            reviewed_at: None,
            version: 1,
        };
        apply_status(&mut asset, status);
        self.repository.insert(&asset).await
    }

    async fn replace(
        &self,
        current: PictureAsset,
        content: &StoredContent,
        hash: &str,
        filename: &str,
        name: Option<String>,
        status: ModerationStatus,
    ) -> Result<PictureAsset, AppError> {
        let expected_version = current.version;
        let mut updated = current;
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            updated.name = name;
        }
        updated.original_filename = filename.to_string();
        updated.content_hash = hash.to_string();
        updated.thumbnail = content.thumbnail.clone();
        updated.default = content.default.clone();
        updated.original = content.original.clone();
        updated.size_bytes = content.size_bytes;
        updated.width = content.width;
        updated.height = content.height;
        updated.aspect_ratio = aspect_ratio(content.width, content.height);
        updated.format = content.format.clone();
        updated.dominant_color = content.dominant_color;
        updated.moderation_message = None;
        updated.reviewer_id = None;
        updated.reviewed_at = None;
        updated.edited_at = Utc::now();
        apply_status(&mut updated, status);

        self.repository
            .replace_content(&updated, expected_version)
            .await
    }

    async fn run_blocking<F, R>(&self, job: F) -> Result<R, AppError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.pool.submit_blocking(job).await?;
        match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) | Err(e) => Err(AppError::Internal(format!("Blocking job failed: {}", e))),
        }
    }

    async fn remove_units(&self, units: &[StoredUnit]) {
        let paths: Vec<&str> = units
            .iter()
            .map(|unit| unit.derivative.storage_path.as_str())
            .collect();
        self.remove_paths(&paths).await;
    }

    /// Best-effort cleanup of files written by a failed upload.
    async fn remove_paths(&self, paths: &[&str]) {
        for path in paths {
            if let Err(e) = self.storage.delete(path).await {
                tracing::warn!(storage_key = %path, error = %e, "Failed to remove orphaned derivative");
            }
        }
    }

    async fn invalidate(&self, picture_id: Uuid) {
        drop(self.cache.invalidate_prefix(PICTURE_LIST_CACHE_PREFIX).await);
        drop(self.cache.invalidate(&picture_detail_cache_key(picture_id)).await);
    }
}

fn apply_status(asset: &mut PictureAsset, status: ModerationStatus) {
    asset.moderation_status = status;
    if status == ModerationStatus::Approved {
        asset.reviewed_at = Some(Utc::now());
    }
}

fn display_name(name: Option<String>, filename: &str) -> String {
    name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
        std::path::Path::new(filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(filename)
            .to_string()
    })
}
