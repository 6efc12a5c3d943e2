//! Galleria Storage Library
//!
//! Object storage abstraction for picture derivatives, with local filesystem,
//! S3 (via `object_store`) and in-memory backends.
//!
//! # Storage key format
//!
//! Keys are scoped by where the picture lives:
//!
//! - **Public gallery**: `public/{owner_id}/{filename}`
//! - **Team space**: `space/{space_id}/{filename}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use galleria_core::StorageBackend;
pub use keys::{picture_storage_key, validate_storage_key, StorageScope};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
