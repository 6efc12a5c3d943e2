use chrono::{DateTime, Utc};
use galleria_core::{
    AppError, Derivative, DominantColor, ModerationStatus, PictureAsset, PictureQuery,
    ReviewDecision,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::picture::{PictureRepository, ReviewApplied};

const PICTURE_COLUMNS: &str = r#"
    id, owner_id, space_id, name, original_filename, content_hash,
    thumbnail, default_variant, original,
    size_bytes, width, height, aspect_ratio, format, dominant_color,
    moderation_status, moderation_message, reviewer_id,
    created_at, edited_at, reviewed_at, version
"#;

#[derive(Debug, FromRow)]
struct PictureRow {
    id: Uuid,
    owner_id: Uuid,
    space_id: Option<Uuid>,
    name: String,
    original_filename: String,
    content_hash: String,
    thumbnail: Json<Derivative>,
    default_variant: Json<Derivative>,
    original: Json<Derivative>,
    size_bytes: i64,
    width: i32,
    height: i32,
    aspect_ratio: f64,
    format: String,
    dominant_color: Option<Json<DominantColor>>,
    moderation_status: ModerationStatus,
    moderation_message: Option<String>,
    reviewer_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    edited_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl From<PictureRow> for PictureAsset {
    fn from(row: PictureRow) -> Self {
        PictureAsset {
            id: row.id,
            owner_id: row.owner_id,
            space_id: row.space_id,
            name: row.name,
            original_filename: row.original_filename,
            content_hash: row.content_hash,
            thumbnail: row.thumbnail.0,
            default: row.default_variant.0,
            original: row.original.0,
            size_bytes: row.size_bytes,
            width: row.width.max(0) as u32,
            height: row.height.max(0) as u32,
            aspect_ratio: row.aspect_ratio,
            format: row.format,
            dominant_color: row.dominant_color.map(|c| c.0),
            moderation_status: row.moderation_status,
            moderation_message: row.moderation_message,
            reviewer_id: row.reviewer_id,
            created_at: row.created_at,
            edited_at: row.edited_at,
            reviewed_at: row.reviewed_at,
            version: row.version,
        }
    }
}

#[derive(Clone)]
pub struct PgPictureRepository {
    pool: PgPool,
}

impl PgPictureRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_state(&self, id: Uuid) -> Result<(ModerationStatus, i64), AppError> {
        let state: Option<(ModerationStatus, i64)> =
            sqlx::query_as("SELECT moderation_status, version FROM pictures WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        state.ok_or_else(|| AppError::NotFound(format!("Picture {} not found", id)))
    }

    /// Why a conditional review update touched no row.
    async fn not_applied(&self, id: Uuid, version: i64) -> Result<ReviewApplied, AppError> {
        let (status, current_version) = self.current_state(id).await?;
        if current_version != version {
            return Ok(ReviewApplied::Superseded { current_version });
        }
        Ok(ReviewApplied::AlreadyTerminal(status))
    }
}

#[async_trait::async_trait]
impl PictureRepository for PgPictureRepository {
    #[tracing::instrument(skip(self, asset), fields(db.table = "pictures", db.operation = "insert", picture_id = %asset.id))]
    async fn insert(&self, asset: &PictureAsset) -> Result<PictureAsset, AppError> {
        let sql = format!(
            r#"
            INSERT INTO pictures ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (id) DO NOTHING
            RETURNING {columns}
            "#,
            columns = PICTURE_COLUMNS
        );

        let row: Option<PictureRow> = sqlx::query_as::<Postgres, PictureRow>(&sql)
            .bind(asset.id)
            .bind(asset.owner_id)
            .bind(asset.space_id)
            .bind(&asset.name)
            .bind(&asset.original_filename)
            .bind(&asset.content_hash)
            .bind(Json(&asset.thumbnail))
            .bind(Json(&asset.default))
            .bind(Json(&asset.original))
            .bind(asset.size_bytes)
            .bind(asset.width as i32)
            .bind(asset.height as i32)
            .bind(asset.aspect_ratio)
            .bind(&asset.format)
            .bind(asset.dominant_color.as_ref().map(Json))
            .bind(asset.moderation_status)
            .bind(&asset.moderation_message)
            .bind(asset.reviewer_id)
            .bind(asset.created_at)
            .bind(asset.edited_at)
            .bind(asset.reviewed_at)
            .bind(asset.version)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PictureAsset::from)
            .ok_or_else(|| AppError::Conflict(format!("Picture {} already exists", asset.id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "pictures", db.operation = "select"))]
    async fn get(&self, id: Uuid) -> Result<Option<PictureAsset>, AppError> {
        let sql = format!("SELECT {} FROM pictures WHERE id = $1", PICTURE_COLUMNS);
        let row: Option<PictureRow> = sqlx::query_as::<Postgres, PictureRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PictureAsset::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "pictures", db.operation = "select"))]
    async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<PictureAsset>, AppError> {
        let sql = format!(
            "SELECT {} FROM pictures WHERE content_hash = $1 ORDER BY created_at ASC, id ASC LIMIT 1",
            PICTURE_COLUMNS
        );
        let row: Option<PictureRow> = sqlx::query_as::<Postgres, PictureRow>(&sql)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PictureAsset::from))
    }

    #[tracing::instrument(skip(self, asset), fields(db.table = "pictures", db.operation = "update", picture_id = %asset.id))]
    async fn replace_content(
        &self,
        asset: &PictureAsset,
        expected_version: i64,
    ) -> Result<PictureAsset, AppError> {
        let sql = format!(
            r#"
            UPDATE pictures
            SET name = $3, original_filename = $4, content_hash = $5,
                thumbnail = $6, default_variant = $7, original = $8,
                size_bytes = $9, width = $10, height = $11, aspect_ratio = $12,
                format = $13, dominant_color = $14,
                moderation_status = $15, moderation_message = $16,
                reviewer_id = $17, reviewed_at = $18, edited_at = $19,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            PICTURE_COLUMNS
        );

        let row: Option<PictureRow> = sqlx::query_as::<Postgres, PictureRow>(&sql)
            .bind(asset.id)
            .bind(expected_version)
            .bind(&asset.name)
            .bind(&asset.original_filename)
            .bind(&asset.content_hash)
            .bind(Json(&asset.thumbnail))
            .bind(Json(&asset.default))
            .bind(Json(&asset.original))
            .bind(asset.size_bytes)
            .bind(asset.width as i32)
            .bind(asset.height as i32)
            .bind(asset.aspect_ratio)
            .bind(&asset.format)
            .bind(asset.dominant_color.as_ref().map(Json))
            .bind(asset.moderation_status)
            .bind(&asset.moderation_message)
            .bind(asset.reviewer_id)
            .bind(asset.reviewed_at)
            .bind(asset.edited_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                // Distinguish a lost race from a missing row.
                self.current_state(asset.id).await?;
                Err(AppError::Conflict(format!(
                    "Picture {} was modified concurrently (expected version {})",
                    asset.id, expected_version
                )))
            }
        }
    }

    #[tracing::instrument(skip(self, decision), fields(db.table = "pictures", db.operation = "update", status = %decision.status))]
    async fn apply_review(
        &self,
        id: Uuid,
        version: i64,
        decision: &ReviewDecision,
    ) -> Result<ReviewApplied, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pictures
            SET moderation_status = $3, moderation_message = $4,
                reviewer_id = $5, reviewed_at = $6
            WHERE id = $1 AND version = $2 AND moderation_status = 'pending'
            "#,
        )
        .bind(id)
        .bind(version)
        .bind(decision.status)
        .bind(&decision.message)
        .bind(decision.reviewer_id)
        .bind(decision.reviewed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ReviewApplied::Applied);
        }
        self.not_applied(id, version).await
    }

    #[tracing::instrument(skip(self, message), fields(db.table = "pictures", db.operation = "update"))]
    async fn escalate(
        &self,
        id: Uuid,
        version: i64,
        message: &str,
    ) -> Result<ReviewApplied, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pictures
            SET moderation_message = $3
            WHERE id = $1 AND version = $2 AND moderation_status = 'pending'
            "#,
        )
        .bind(id)
        .bind(version)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(ReviewApplied::Applied);
        }
        self.not_applied(id, version).await
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "pictures", db.operation = "select"))]
    async fn list(&self, query: &PictureQuery) -> Result<Vec<PictureAsset>, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM pictures WHERE 1 = 1", PICTURE_COLUMNS));

        if let Some(owner_id) = query.owner_id {
            builder.push(" AND owner_id = ").push_bind(owner_id);
        }
        match query.space_id {
            Some(space_id) => {
                builder.push(" AND space_id = ").push_bind(space_id);
            }
            None => {
                builder.push(" AND space_id IS NULL");
            }
        }
        if let Some(status) = query.status {
            builder.push(" AND moderation_status = ").push_bind(status);
        }
        if let Some(ref needle) = query.name_contains {
            builder
                .push(" AND LOWER(name) LIKE ")
                .push_bind(format!("%{}%", needle.to_lowercase()));
        }
        builder
            .push(" ORDER BY created_at DESC, id ASC LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let rows: Vec<PictureRow> = builder
            .build_query_as::<PictureRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PictureAsset::from).collect())
    }
}
