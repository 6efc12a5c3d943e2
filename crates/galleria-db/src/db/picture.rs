use galleria_core::{AppError, ModerationStatus, PictureAsset, PictureQuery, ReviewDecision};
use uuid::Uuid;

/// Result of a conditional moderation update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewApplied {
    /// The asset was Pending and has been updated.
    Applied,
    /// The asset already carried a terminal status; nothing changed.
    AlreadyTerminal(ModerationStatus),
    /// The content was replaced after the reviewed version; nothing changed.
    Superseded { current_version: i64 },
}

impl ReviewApplied {
    pub fn applied(self) -> bool {
        matches!(self, ReviewApplied::Applied)
    }
}

/// Trait for picture repository operations
/// This abstracts the storage backend (PostgreSQL or in-memory)
#[async_trait::async_trait]
pub trait PictureRepository: Send + Sync {
    /// Fails with `Conflict` when the id is already taken.
    async fn insert(&self, asset: &PictureAsset) -> Result<PictureAsset, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<PictureAsset>, AppError>;

    /// Oldest asset whose original bytes hash to `content_hash`.
    async fn find_by_content_hash(&self, content_hash: &str)
        -> Result<Option<PictureAsset>, AppError>;

    /// Replace content fields and moderation state of an existing asset.
    ///
    /// Succeeds only when the stored version equals `expected_version`; the
    /// stored version is then incremented. A mismatch is a `Conflict`.
    async fn replace_content(
        &self,
        asset: &PictureAsset,
        expected_version: i64,
    ) -> Result<PictureAsset, AppError>;

    /// Apply a terminal decision, only if the asset is still Pending and
    /// still at `version`, the version whose content was reviewed.
    ///
    /// Unknown ids are `NotFound`.
    async fn apply_review(
        &self,
        id: Uuid,
        version: i64,
        decision: &ReviewDecision,
    ) -> Result<ReviewApplied, AppError>;

    /// Record a manual-review escalation for `version`. The asset stays Pending.
    async fn escalate(
        &self,
        id: Uuid,
        version: i64,
        message: &str,
    ) -> Result<ReviewApplied, AppError>;

    async fn list(&self, query: &PictureQuery) -> Result<Vec<PictureAsset>, AppError>;
}
