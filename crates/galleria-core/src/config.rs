//! Configuration module
//!
//! Every component of the pipeline is configured from environment variables
//! (optionally loaded from a `.env` file). Defaults live in the `Default`
//! impls so tests can build components without touching the environment.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_FILE_SIZE_MB: usize = 20;
const MAX_IMAGE_DIMENSION: u32 = 12_000;
const INGEST_POOL_WORKERS: usize = 8;
const INGEST_POOL_QUEUE_DEPTH: usize = 64;
const INGEST_UNIT_RETRIES: u32 = 1;
const REMOTE_FETCH_TIMEOUT_SECS: u64 = 15;
const PRESIGNED_URL_TTL_SECS: u64 = 600;
const THUMBNAIL_MAX_EDGE: u32 = 256;
const THUMBNAIL_MIN_SOURCE_BYTES: usize = 20 * 1024;
const DEFAULT_COMPRESS_THRESHOLD_BYTES: usize = 512 * 1024;
const DEFAULT_COMPRESSION_RATIO: f32 = 0.8;
const REVIEW_QUEUE_CAPACITY: usize = 100;
const REVIEW_STALE_CLAIM_GRACE_SECS: u64 = 300;
const REVIEW_CAS_ATTEMPTS: usize = 16;
const MODERATION_TICK_INTERVAL_MS: u64 = 5_000;
const MODERATION_POOL_WORKERS: usize = 2;
const MODERATION_POOL_QUEUE_DEPTH: usize = 2;
const MODERATION_POLL_INTERVAL_MS: u64 = 2_000;
const MODERATION_POLL_MAX_ATTEMPTS: u32 = 15;
const MODERATION_POLL_DEADLINE_SECS: u64 = 45;
const MODERATION_MAX_REVIEW_CYCLES: u32 = 5;
const MODERATION_REQUEST_TIMEOUT_SECS: u64 = 10;
const MODERATION_DEFAULT_THRESHOLD: f32 = 80.0;
const CACHE_LOCAL_CAPACITY: usize = 1_024;
const CACHE_LOCAL_TTL_SECS: u64 = 60;
const CACHE_TTL_SECS: u64 = 300;
const CACHE_TTL_JITTER_SECS: u64 = 60;
const CACHE_DOUBLE_DELETE_DELAY_MS: u64 = 500;
const CACHE_DOUBLE_DELETE_RETRIES: u32 = 3;
const CACHE_DOUBLE_DELETE_RETRY_WAIT_MS: u64 = 200;
const CACHE_POOL_WORKERS: usize = 2;
const CACHE_POOL_QUEUE_DEPTH: usize = 256;

const SUPPORTED_OUTPUT_FORMATS: [&str; 4] = ["webp", "jpeg", "jpg", "png"];

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    pub local_base_url: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    // Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub s3_endpoint: Option<String>,
    pub presigned_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_path: "./data/pictures".to_string(),
            local_base_url: "http://localhost:8080/pictures".to_string(),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            presigned_url_ttl_secs: PRESIGNED_URL_TTL_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub max_file_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub max_dimension: u32,
    pub pool_workers: usize,
    pub pool_queue_depth: usize,
    /// Extra attempts granted to a failed fan-out unit.
    pub unit_retries: u32,
    // If set, only URLs from these domains are allowed for remote ingestion
    pub url_upload_allowlist: Option<Vec<String>>,
    pub remote_fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
            allowed_extensions: split_list("jpg,jpeg,png,gif,webp"),
            allowed_content_types: split_list("image/jpeg,image/png,image/gif,image/webp"),
            max_dimension: MAX_IMAGE_DIMENSION,
            pool_workers: INGEST_POOL_WORKERS,
            pool_queue_depth: INGEST_POOL_QUEUE_DEPTH,
            unit_retries: INGEST_UNIT_RETRIES,
            url_upload_allowlist: None,
            remote_fetch_timeout_secs: REMOTE_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DerivativeConfig {
    pub thumbnail_max_edge: u32,
    /// Sources smaller than this are stored as their own thumbnail.
    pub thumbnail_min_source_bytes: usize,
    pub thumbnail_format: String,
    /// Sources larger than this are re-encoded for the default derivative.
    pub default_compress_threshold_bytes: usize,
    /// Encoder quality in `(0, 1]`.
    pub default_compression_ratio: f32,
    pub default_format: String,
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumbnail_max_edge: THUMBNAIL_MAX_EDGE,
            thumbnail_min_source_bytes: THUMBNAIL_MIN_SOURCE_BYTES,
            thumbnail_format: "webp".to_string(),
            default_compress_threshold_bytes: DEFAULT_COMPRESS_THRESHOLD_BYTES,
            default_compression_ratio: DEFAULT_COMPRESSION_RATIO,
            default_format: "webp".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReviewQueueConfig {
    pub capacity: usize,
    /// Directory of the durable overflow store; in-memory when unset.
    pub overflow_store_path: Option<String>,
    pub stale_claim_grace_secs: u64,
    pub cas_attempts: usize,
}

impl Default for ReviewQueueConfig {
    fn default() -> Self {
        Self {
            capacity: REVIEW_QUEUE_CAPACITY,
            overflow_store_path: None,
            stale_claim_grace_secs: REVIEW_STALE_CLAIM_GRACE_SECS,
            cas_attempts: REVIEW_CAS_ATTEMPTS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModerationConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub pool_workers: usize,
    pub pool_queue_depth: usize,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_deadline_secs: u64,
    /// Releases tolerated before a task is escalated to manual review.
    pub max_review_cycles: u32,
    /// Deny-list: label -> confidence threshold (0-100).
    pub label_thresholds: HashMap<String, f32>,
    pub default_threshold: f32,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            request_timeout_secs: MODERATION_REQUEST_TIMEOUT_SECS,
            tick_interval_ms: MODERATION_TICK_INTERVAL_MS,
            pool_workers: MODERATION_POOL_WORKERS,
            pool_queue_depth: MODERATION_POOL_QUEUE_DEPTH,
            poll_interval_ms: MODERATION_POLL_INTERVAL_MS,
            poll_max_attempts: MODERATION_POLL_MAX_ATTEMPTS,
            poll_deadline_secs: MODERATION_POLL_DEADLINE_SECS,
            max_review_cycles: MODERATION_MAX_REVIEW_CYCLES,
            label_thresholds: HashMap::new(),
            default_threshold: MODERATION_DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub local_capacity: usize,
    pub local_ttl_secs: u64,
    pub ttl_secs: u64,
    pub ttl_jitter_secs: u64,
    pub double_delete_delay_ms: u64,
    pub double_delete_retries: u32,
    pub double_delete_retry_wait_ms: u64,
    pub pool_workers: usize,
    pub pool_queue_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: CACHE_LOCAL_CAPACITY,
            local_ttl_secs: CACHE_LOCAL_TTL_SECS,
            ttl_secs: CACHE_TTL_SECS,
            ttl_jitter_secs: CACHE_TTL_JITTER_SECS,
            double_delete_delay_ms: CACHE_DOUBLE_DELETE_DELAY_MS,
            double_delete_retries: CACHE_DOUBLE_DELETE_RETRIES,
            double_delete_retry_wait_ms: CACHE_DOUBLE_DELETE_RETRY_WAIT_MS,
            pool_workers: CACHE_POOL_WORKERS,
            pool_queue_depth: CACHE_POOL_QUEUE_DEPTH,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub log_filter: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "galleria=info".to_string(),
            json_logs: false,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, Default)]
pub struct GalleriaConfig {
    pub environment: String,
    /// Postgres asset store; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub derivatives: DerivativeConfig,
    pub review_queue: ReviewQueueConfig,
    pub moderation: ModerationConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

impl GalleriaConfig {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse::<StorageBackend>()?,
            Err(_) => StorageBackend::Local,
        };

        let storage_defaults = StorageConfig::default();
        let storage = StorageConfig {
            backend: storage_backend,
            local_path: env::var("LOCAL_STORAGE_PATH").unwrap_or(storage_defaults.local_path),
            local_base_url: env::var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or(storage_defaults.local_base_url),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            presigned_url_ttl_secs: parse_env("PRESIGNED_URL_TTL_SECS", PRESIGNED_URL_TTL_SECS),
        };

        let ingest = IngestConfig {
            max_file_size_bytes: parse_env("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB) * 1024 * 1024,
            allowed_extensions: split_list(
                &env::var("ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| "jpg,jpeg,png,gif,webp".to_string()),
            ),
            allowed_content_types: split_list(
                &env::var("ALLOWED_CONTENT_TYPES")
                    .unwrap_or_else(|_| "image/jpeg,image/png,image/gif,image/webp".to_string()),
            ),
            max_dimension: parse_env("MAX_IMAGE_DIMENSION", MAX_IMAGE_DIMENSION),
            pool_workers: parse_env("INGEST_POOL_WORKERS", INGEST_POOL_WORKERS),
            pool_queue_depth: parse_env("INGEST_POOL_QUEUE_DEPTH", INGEST_POOL_QUEUE_DEPTH),
            unit_retries: parse_env("INGEST_UNIT_RETRIES", INGEST_UNIT_RETRIES),
            url_upload_allowlist: env::var("URL_UPLOAD_ALLOWLIST")
                .ok()
                .map(|s| split_list(&s)),
            remote_fetch_timeout_secs: parse_env(
                "REMOTE_FETCH_TIMEOUT_SECS",
                REMOTE_FETCH_TIMEOUT_SECS,
            ),
        };

        let derivatives = DerivativeConfig {
            thumbnail_max_edge: parse_env("THUMBNAIL_MAX_EDGE", THUMBNAIL_MAX_EDGE),
            thumbnail_min_source_bytes: parse_env(
                "THUMBNAIL_MIN_SOURCE_BYTES",
                THUMBNAIL_MIN_SOURCE_BYTES,
            ),
            thumbnail_format: env::var("THUMBNAIL_FORMAT")
                .unwrap_or_else(|_| "webp".to_string())
                .to_lowercase(),
            default_compress_threshold_bytes: parse_env(
                "DEFAULT_COMPRESS_THRESHOLD_BYTES",
                DEFAULT_COMPRESS_THRESHOLD_BYTES,
            ),
            default_compression_ratio: parse_env(
                "DEFAULT_COMPRESSION_RATIO",
                DEFAULT_COMPRESSION_RATIO,
            ),
            default_format: env::var("DEFAULT_FORMAT")
                .unwrap_or_else(|_| "webp".to_string())
                .to_lowercase(),
        };

        let review_queue = ReviewQueueConfig {
            capacity: parse_env("REVIEW_QUEUE_CAPACITY", REVIEW_QUEUE_CAPACITY),
            overflow_store_path: env::var("OVERFLOW_STORE_PATH").ok(),
            stale_claim_grace_secs: parse_env(
                "REVIEW_STALE_CLAIM_GRACE_SECS",
                REVIEW_STALE_CLAIM_GRACE_SECS,
            ),
            cas_attempts: parse_env("REVIEW_CAS_ATTEMPTS", REVIEW_CAS_ATTEMPTS),
        };

        let moderation = ModerationConfig {
            endpoint: env::var("MODERATION_ENDPOINT").ok(),
            api_key: env::var("MODERATION_API_KEY").ok(),
            request_timeout_secs: parse_env(
                "MODERATION_REQUEST_TIMEOUT_SECS",
                MODERATION_REQUEST_TIMEOUT_SECS,
            ),
            tick_interval_ms: parse_env("MODERATION_TICK_INTERVAL_MS", MODERATION_TICK_INTERVAL_MS),
            pool_workers: parse_env("MODERATION_POOL_WORKERS", MODERATION_POOL_WORKERS),
            pool_queue_depth: parse_env("MODERATION_POOL_QUEUE_DEPTH", MODERATION_POOL_QUEUE_DEPTH),
            poll_interval_ms: parse_env("MODERATION_POLL_INTERVAL_MS", MODERATION_POLL_INTERVAL_MS),
            poll_max_attempts: parse_env(
                "MODERATION_POLL_MAX_ATTEMPTS",
                MODERATION_POLL_MAX_ATTEMPTS,
            ),
            poll_deadline_secs: parse_env(
                "MODERATION_POLL_DEADLINE_SECS",
                MODERATION_POLL_DEADLINE_SECS,
            ),
            max_review_cycles: parse_env(
                "MODERATION_MAX_REVIEW_CYCLES",
                MODERATION_MAX_REVIEW_CYCLES,
            ),
            label_thresholds: match env::var("MODERATION_LABEL_THRESHOLDS") {
                Ok(raw) => parse_label_thresholds(&raw)?,
                Err(_) => HashMap::new(),
            },
            default_threshold: parse_env(
                "MODERATION_DEFAULT_THRESHOLD",
                MODERATION_DEFAULT_THRESHOLD,
            ),
        };

        let cache = CacheConfig {
            local_capacity: parse_env("CACHE_LOCAL_CAPACITY", CACHE_LOCAL_CAPACITY),
            local_ttl_secs: parse_env("CACHE_LOCAL_TTL_SECS", CACHE_LOCAL_TTL_SECS),
            ttl_secs: parse_env("CACHE_TTL_SECS", CACHE_TTL_SECS),
            ttl_jitter_secs: parse_env("CACHE_TTL_JITTER_SECS", CACHE_TTL_JITTER_SECS),
            double_delete_delay_ms: parse_env(
                "CACHE_DOUBLE_DELETE_DELAY_MS",
                CACHE_DOUBLE_DELETE_DELAY_MS,
            ),
            double_delete_retries: parse_env(
                "CACHE_DOUBLE_DELETE_RETRIES",
                CACHE_DOUBLE_DELETE_RETRIES,
            ),
            double_delete_retry_wait_ms: parse_env(
                "CACHE_DOUBLE_DELETE_RETRY_WAIT_MS",
                CACHE_DOUBLE_DELETE_RETRY_WAIT_MS,
            ),
            pool_workers: parse_env("CACHE_POOL_WORKERS", CACHE_POOL_WORKERS),
            pool_queue_depth: parse_env("CACHE_POOL_QUEUE_DEPTH", CACHE_POOL_QUEUE_DEPTH),
        };

        let telemetry = TelemetryConfig {
            log_filter: env::var("RUST_LOG").unwrap_or_else(|_| "galleria=info".to_string()),
            json_logs: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let config = GalleriaConfig {
            environment,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_env("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            storage,
            ingest,
            derivatives,
            review_queue,
            moderation,
            cache,
            telemetry,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when STORAGE_BACKEND=s3"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when STORAGE_BACKEND=s3"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_path.trim().is_empty() {
                    return Err(anyhow::anyhow!("LOCAL_STORAGE_PATH cannot be empty"));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "STORAGE_BACKEND=memory is not allowed in production"
                    ));
                }
            }
        }

        if self.ingest.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }
        if self.ingest.pool_workers == 0 {
            return Err(anyhow::anyhow!("INGEST_POOL_WORKERS must be greater than 0"));
        }

        for (name, format) in [
            ("THUMBNAIL_FORMAT", &self.derivatives.thumbnail_format),
            ("DEFAULT_FORMAT", &self.derivatives.default_format),
        ] {
            if !SUPPORTED_OUTPUT_FORMATS.contains(&format.as_str()) {
                return Err(anyhow::anyhow!(
                    "{} must be one of {:?}, got '{}'",
                    name,
                    SUPPORTED_OUTPUT_FORMATS,
                    format
                ));
            }
        }
        let ratio = self.derivatives.default_compression_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(anyhow::anyhow!(
                "DEFAULT_COMPRESSION_RATIO must be in (0, 1], got {}",
                ratio
            ));
        }
        if self.derivatives.thumbnail_max_edge == 0 {
            return Err(anyhow::anyhow!("THUMBNAIL_MAX_EDGE must be greater than 0"));
        }

        if self.review_queue.capacity == 0 {
            return Err(anyhow::anyhow!("REVIEW_QUEUE_CAPACITY must be greater than 0"));
        }
        if self.review_queue.cas_attempts == 0 {
            return Err(anyhow::anyhow!("REVIEW_CAS_ATTEMPTS must be greater than 0"));
        }

        if self.moderation.pool_workers == 0 {
            return Err(anyhow::anyhow!(
                "MODERATION_POOL_WORKERS must be greater than 0"
            ));
        }
        if self.moderation.pool_workers > self.ingest.pool_workers {
            return Err(anyhow::anyhow!(
                "MODERATION_POOL_WORKERS ({}) must not exceed INGEST_POOL_WORKERS ({})",
                self.moderation.pool_workers,
                self.ingest.pool_workers
            ));
        }
        if self.moderation.poll_max_attempts == 0 {
            return Err(anyhow::anyhow!(
                "MODERATION_POLL_MAX_ATTEMPTS must be greater than 0"
            ));
        }
        if self.moderation.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "MODERATION_TICK_INTERVAL_MS must be greater than 0"
            ));
        }
        // A claim lives for one create request, the poll deadline and the
        // query still in flight when the deadline passes.
        let longest_claim_secs = self
            .moderation
            .poll_deadline_secs
            .saturating_add(self.moderation.request_timeout_secs.saturating_mul(2));
        if self.review_queue.stale_claim_grace_secs <= longest_claim_secs {
            return Err(anyhow::anyhow!(
                "REVIEW_STALE_CLAIM_GRACE_SECS ({}) must exceed MODERATION_POLL_DEADLINE_SECS plus two MODERATION_REQUEST_TIMEOUT_SECS ({})",
                self.review_queue.stale_claim_grace_secs,
                longest_claim_secs
            ));
        }
        if self.is_production() && self.moderation.endpoint.is_none() {
            return Err(anyhow::anyhow!(
                "MODERATION_ENDPOINT must be set in production"
            ));
        }

        if self.cache.local_capacity == 0 {
            return Err(anyhow::anyhow!("CACHE_LOCAL_CAPACITY must be greater than 0"));
        }
        if self.cache.pool_workers == 0 {
            return Err(anyhow::anyhow!("CACHE_POOL_WORKERS must be greater than 0"));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr + ToString + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `label:threshold,label:threshold`. Label names keep their case.
pub fn parse_label_thresholds(raw: &str) -> Result<HashMap<String, f32>, anyhow::Error> {
    let mut thresholds = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (label, value) = entry.split_once(':').ok_or_else(|| {
            anyhow::anyhow!(
                "MODERATION_LABEL_THRESHOLDS entry '{}' must look like label:threshold",
                entry
            )
        })?;
        let threshold: f32 = value.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "MODERATION_LABEL_THRESHOLDS threshold '{}' for '{}' is not a number",
                value,
                label
            )
        })?;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(anyhow::anyhow!(
                "MODERATION_LABEL_THRESHOLDS threshold for '{}' must be within 0-100",
                label
            ));
        }
        thresholds.insert(label.trim().to_string(), threshold);
    }
    Ok(thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GalleriaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.review_queue.capacity, 100);
        assert_eq!(config.moderation.poll_max_attempts, 15);
        assert_eq!(config.moderation.tick_interval_ms, 5_000);
    }

    #[test]
    fn test_parse_label_thresholds() {
        let parsed = parse_label_thresholds("violent_gunKnives:100, porn_sexualBehavior:70").unwrap();
        assert_eq!(parsed.get("violent_gunKnives"), Some(&100.0));
        assert_eq!(parsed.get("porn_sexualBehavior"), Some(&70.0));
    }

    #[test]
    fn test_parse_label_thresholds_rejects_garbage() {
        assert!(parse_label_thresholds("violent_gunKnives").is_err());
        assert!(parse_label_thresholds("violent_gunKnives:lots").is_err());
        assert!(parse_label_thresholds("violent_gunKnives:180").is_err());
        assert!(parse_label_thresholds("").unwrap().is_empty());
    }

    #[test]
    fn test_validate_rejects_s3_without_bucket() {
        let mut config = GalleriaConfig::default();
        config.storage.backend = StorageBackend::S3;
        config.storage.s3_region = Some("eu-west-1".to_string());
        assert!(config.validate().is_err());

        config.storage.s3_bucket = Some("pictures".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_grace_beyond_longest_review() {
        let mut config = GalleriaConfig::default();
        config.moderation.poll_deadline_secs = 45;
        config.moderation.request_timeout_secs = 10;

        config.review_queue.stale_claim_grace_secs = 65;
        assert!(config.validate().is_err());
        config.review_queue.stale_claim_grace_secs = 30;
        assert!(config.validate().is_err());

        config.review_queue.stale_claim_grace_secs = 66;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_output_format() {
        let mut config = GalleriaConfig::default();
        config.derivatives.default_format = "avif".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_compression_ratio() {
        let mut config = GalleriaConfig::default();
        config.derivatives.default_compression_ratio = 0.0;
        assert!(config.validate().is_err());
        config.derivatives.default_compression_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_backend_rejected_in_production() {
        let mut config = GalleriaConfig {
            environment: "production".to_string(),
            ..GalleriaConfig::default()
        };
        config.storage.backend = StorageBackend::Memory;
        config.moderation.endpoint = Some("https://moderation.internal".to_string());
        assert!(config.validate().is_err());
    }
}
