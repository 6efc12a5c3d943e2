//! Derivative file naming.
//!
//! `<yyyymmdd>_<stem><suffix>.<ext>` where the stem is the first 16 hex chars of
//! SHA-256(upload timestamp in nanoseconds + original filename). All three
//! derivatives of one upload share the stem.

use chrono::{DateTime, Utc};
use galleria_core::DerivativeKind;
use sha2::{Digest, Sha256};

const STEM_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct DerivativeNamer {
    date_prefix: String,
    stem: String,
}

impl DerivativeNamer {
    pub fn new(uploaded_at: DateTime<Utc>, original_filename: &str) -> Self {
        let nanos = uploaded_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| uploaded_at.timestamp_micros() * 1_000);

        let mut hasher = Sha256::new();
        hasher.update(nanos.to_string().as_bytes());
        hasher.update(original_filename.as_bytes());
        let digest = hex::encode(hasher.finalize());

        Self {
            date_prefix: uploaded_at.format("%Y%m%d").to_string(),
            stem: digest[..STEM_LEN].to_string(),
        }
    }

    pub fn file_name(&self, kind: DerivativeKind, extension: &str) -> String {
        format!(
            "{}_{}{}.{}",
            self.date_prefix,
            self.stem,
            kind.file_suffix(),
            extension.trim_start_matches('.').to_lowercase()
        )
    }
}
