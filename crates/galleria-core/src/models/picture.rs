use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::review::ModerationStatus;

/// The three stored variants of every picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeKind {
    Thumbnail,
    Default,
    Original,
}

impl DerivativeKind {
    pub const ALL: [DerivativeKind; 3] = [
        DerivativeKind::Original,
        DerivativeKind::Default,
        DerivativeKind::Thumbnail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DerivativeKind::Thumbnail => "thumbnail",
            DerivativeKind::Default => "default",
            DerivativeKind::Original => "original",
        }
    }

    /// Suffix appended to the generated file stem.
    pub fn file_suffix(self) -> &'static str {
        match self {
            DerivativeKind::Thumbnail => "_thumbnail",
            DerivativeKind::Default => "",
            DerivativeKind::Original => "_original",
        }
    }
}

impl fmt::Display for DerivativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one derivative lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivative {
    pub url: String,
    pub storage_path: String,
    /// File format extension, e.g. `webp`.
    pub format: String,
}

/// Representative color of a picture plus its HSV search buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominantColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Degrees in `[0, 360)`.
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
    /// `0..36`
    pub hue_bucket: u8,
    /// `0..10`
    pub saturation_bucket: u8,
    /// `0..10`
    pub value_bucket: u8,
}

impl DominantColor {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureAsset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub space_id: Option<Uuid>,
    pub name: String,
    pub original_filename: String,
    /// SHA-256 hex of the original bytes.
    pub content_hash: String,
    pub thumbnail: Derivative,
    pub default: Derivative,
    pub original: Derivative,
    pub size_bytes: i64,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub format: String,
    pub dominant_color: Option<DominantColor>,
    pub moderation_status: ModerationStatus,
    pub moderation_message: Option<String>,
    pub reviewer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub edited_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Bumped on every content replacement.
    pub version: i64,
}

impl PictureAsset {
    pub fn derivative(&self, kind: DerivativeKind) -> &Derivative {
        match kind {
            DerivativeKind::Thumbnail => &self.thumbnail,
            DerivativeKind::Default => &self.default,
            DerivativeKind::Original => &self.original,
        }
    }

    pub fn is_publicly_visible(&self) -> bool {
        self.moderation_status == ModerationStatus::Approved
    }

    /// Storage paths referenced by this asset, deduplicated.
    pub fn storage_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = DerivativeKind::ALL
            .iter()
            .map(|kind| self.derivative(*kind).storage_path.as_str())
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}

pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        return 0.0;
    }
    let ratio = width as f64 / height as f64;
    (ratio * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_rounds_to_two_places() {
        assert_eq!(aspect_ratio(1920, 1080), 1.78);
        assert_eq!(aspect_ratio(100, 0), 0.0);
    }

    #[test]
    fn test_dominant_color_hex() {
        let color = DominantColor {
            red: 255,
            green: 16,
            blue: 0,
            hue: 4.0,
            saturation: 1.0,
            value: 1.0,
            hue_bucket: 0,
            saturation_bucket: 9,
            value_bucket: 9,
        };
        assert_eq!(color.hex(), "#ff1000");
    }
}
