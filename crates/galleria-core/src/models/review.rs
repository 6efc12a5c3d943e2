use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::picture::PictureAsset;

/// Content-safety review state of a picture.
///
/// Only moves `Pending -> Approved` or `Pending -> Rejected`. A content edit
/// creates a fresh submission and is the only way back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "moderation_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ModerationStatus::Pending)
    }

    pub fn can_transition_to(self, next: ModerationStatus) -> bool {
        matches!(
            (self, next),
            (ModerationStatus::Pending, ModerationStatus::Approved)
                | (ModerationStatus::Pending, ModerationStatus::Rejected)
        )
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationStatus::Pending => write!(f, "pending"),
            ModerationStatus::Approved => write!(f, "approved"),
            ModerationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A terminal moderation outcome ready to be applied to an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub status: ModerationStatus,
    pub message: Option<String>,
    /// `None` for automated reviews.
    pub reviewer_id: Option<Uuid>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewDecision {
    pub fn approved(message: Option<String>) -> Self {
        Self {
            status: ModerationStatus::Approved,
            message,
            reviewer_id: None,
            reviewed_at: Utc::now(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: ModerationStatus::Rejected,
            message: Some(message.into()),
            reviewer_id: None,
            reviewed_at: Utc::now(),
        }
    }
}

/// Unit of work for the moderation worker: one pending picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub picture_id: Uuid,
    pub owner_id: Uuid,
    /// Asset version whose content this task reviews.
    pub version: i64,
    pub enqueued_at: DateTime<Utc>,
    /// Moderation attempts that ended without a terminal result.
    #[serde(default)]
    pub cycles: u32,
}

impl ReviewTask {
    pub fn new(picture_id: Uuid, owner_id: Uuid, version: i64) -> Self {
        Self {
            picture_id,
            owner_id,
            version,
            enqueued_at: Utc::now(),
            cycles: 0,
        }
    }

    pub fn for_asset(asset: &PictureAsset) -> Self {
        Self::new(asset.id, asset.owner_id, asset.version)
    }
}
