//! Shared key generation for storage backends.

use std::fmt;

use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Which namespace a picture's files live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    Public { owner_id: Uuid },
    Space { space_id: Uuid },
}

impl StorageScope {
    pub fn for_picture(owner_id: Uuid, space_id: Option<Uuid>) -> Self {
        match space_id {
            Some(space_id) => StorageScope::Space { space_id },
            None => StorageScope::Public { owner_id },
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageScope::Public { owner_id } => write!(f, "public/{}", owner_id),
            StorageScope::Space { space_id } => write!(f, "space/{}", space_id),
        }
    }
}

/// Generate the storage key for a generated picture file name.
pub fn picture_storage_key(scope: StorageScope, filename: &str) -> String {
    format!("{}/{}", scope, filename)
}

/// Reject keys that could escape the backend's root.
pub fn validate_storage_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if storage_key.contains("..") || storage_key.starts_with('/') || storage_key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}
