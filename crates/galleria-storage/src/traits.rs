//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use galleria_core::AppError;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {}", key)),
            StorageError::InvalidKey(msg) => AppError::Validation(msg),
            other => AppError::dependency("object-storage", other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// Derivative files are written once under a generated key and never
/// modified; `put` on an existing key replaces it.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `storage_key` and return its public URL.
    async fn put(&self, storage_key: &str, data: Bytes, content_type: &str)
        -> StorageResult<String>;

    /// Read a whole object.
    async fn get(&self, storage_key: &str) -> StorageResult<Bytes>;

    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Time-limited GET URL, handed to external services such as moderation.
    async fn presigned_url(&self, storage_key: &str, expires_in: Duration)
        -> StorageResult<String>;

    /// Permanent URL recorded on the derivative descriptor.
    fn public_url(&self, storage_key: &str) -> String;

    fn backend_type(&self) -> StorageBackend;
}
