use galleria_core::AppError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Serialization(e) => AppError::Internal(e.to_string()),
            CacheError::Backend(msg) => AppError::dependency("cache", msg),
            CacheError::Database(e) => AppError::dependency("cache", e.to_string()),
        }
    }
}
