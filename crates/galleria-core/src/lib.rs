//! Galleria Core Library
//!
//! This crate provides core domain models, error types and configuration
//! that are shared across all Galleria components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod task_error;

// Re-export commonly used types
pub use config::{
    CacheConfig, DerivativeConfig, GalleriaConfig, IngestConfig, ModerationConfig,
    ReviewQueueConfig, StorageConfig, TelemetryConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    Derivative, DerivativeKind, DominantColor, ModerationStatus, PictureAsset, PictureQuery,
    ReviewDecision, ReviewTask,
};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
