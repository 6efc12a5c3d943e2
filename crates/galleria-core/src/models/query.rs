use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::picture::PictureAsset;
use super::review::ModerationStatus;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Filter for listing pictures. Serialized form doubles as the cache key input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureQuery {
    pub owner_id: Option<Uuid>,
    pub space_id: Option<Uuid>,
    pub status: Option<ModerationStatus>,
    pub name_contains: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PictureQuery {
    fn default() -> Self {
        Self {
            owner_id: None,
            space_id: None,
            status: None,
            name_contains: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PictureQuery {
    /// The public gallery only ever shows approved pictures outside of spaces.
    pub fn public_gallery() -> Self {
        Self {
            status: Some(ModerationStatus::Approved),
            ..Self::default()
        }
    }

    /// Clamp paging and normalise text filters so equivalent queries share a cache key.
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_LIMIT);
        self.offset = self.offset.max(0);
        self.name_contains = self
            .name_contains
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn matches(&self, asset: &PictureAsset) -> bool {
        if let Some(owner_id) = self.owner_id {
            if asset.owner_id != owner_id {
                return false;
            }
        }
        if self.space_id != asset.space_id {
            return false;
        }
        if let Some(status) = self.status {
            if asset.moderation_status != status {
                return false;
            }
        }
        if let Some(ref needle) = self.name_contains {
            if !asset.name.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps_and_trims() {
        let query = PictureQuery {
            name_contains: Some("  Sunset ".to_string()),
            limit: 10_000,
            offset: -3,
            ..PictureQuery::default()
        }
        .normalized();
        assert_eq!(query.limit, MAX_LIMIT);
        assert_eq!(query.offset, 0);
        assert_eq!(query.name_contains.as_deref(), Some("sunset"));
    }

    #[test]
    fn test_blank_name_filter_is_dropped() {
        let query = PictureQuery {
            name_contains: Some("   ".to_string()),
            ..PictureQuery::default()
        }
        .normalized();
        assert!(query.name_contains.is_none());
    }
}
