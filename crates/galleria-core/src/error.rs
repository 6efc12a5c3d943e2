//! Error types module
//!
//! All pipeline errors are unified under the `AppError` enum. Each variant
//! self-describes its error code, recoverability and log level through the
//! `ErrorMetadata` trait so callers (the moderation worker in particular) can
//! decide between retrying and dropping a unit of work.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like timeouts or a full pool
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be reported and handled.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "DEPENDENCY_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (the operation can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from end users
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Input rejected before any processing happened.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A collaborator (object storage, moderation service, cache) failed.
    #[error("Dependency error ({service}): {message}")]
    Dependency {
        service: &'static str,
        message: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// One or more fan-out units failed after their retries were exhausted.
    #[error("Partial failure: {failed_units:?} failed: {message}")]
    PartialFailure {
        failed_units: Vec<String>,
        message: String,
    },

    /// A bounded worker pool refused the submission.
    #[error("Overloaded: {0}")]
    Overloaded(String),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn dependency(service: &'static str, message: impl Into<String>) -> Self {
        AppError::Dependency {
            service,
            message: message.into(),
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::RowNotFound => AppError::NotFound("Row not found".to_string()),
            SqlxError::PoolTimedOut => AppError::Timeout("Database pool timed out".to_string()),
            other => AppError::Database(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("UUID parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, sensitive, log_level).
fn app_error_static_metadata(err: &AppError) -> (&'static str, bool, bool, LogLevel) {
    match err {
        AppError::Validation(_) => ("VALIDATION_ERROR", false, false, LogLevel::Debug),
        AppError::NotFound(_) => ("NOT_FOUND", false, false, LogLevel::Debug),
        AppError::Dependency { .. } => ("DEPENDENCY_ERROR", true, true, LogLevel::Error),
        AppError::Conflict(_) => ("CONFLICT", true, false, LogLevel::Warn),
        AppError::Timeout(_) => ("TIMEOUT", true, false, LogLevel::Warn),
        AppError::PartialFailure { .. } => ("PARTIAL_FAILURE", true, true, LogLevel::Error),
        AppError::Overloaded(_) => ("OVERLOADED", true, false, LogLevel::Warn),
        #[cfg(feature = "sqlx")]
        AppError::Database(_) => ("DATABASE_ERROR", true, true, LogLevel::Error),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            ("INTERNAL_ERROR", false, true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Returns the variant name for logging and metrics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::NotFound(_) => "NotFound",
            AppError::Dependency { .. } => "Dependency",
            AppError::Conflict(_) => "Conflict",
            AppError::Timeout(_) => "Timeout",
            AppError::PartialFailure { .. } => "PartialFailure",
            AppError::Overloaded(_) => "Overloaded",
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => "Database",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Dependency { service, .. } => {
                format!("Upstream service '{}' is unavailable", service)
            }
            AppError::Conflict(ref msg) => msg.clone(),
            AppError::Timeout(ref msg) => msg.clone(),
            AppError::PartialFailure { failed_units, .. } => {
                format!("Failed to generate: {}", failed_units.join(", "))
            }
            AppError::Overloaded(_) => "Service is busy, try again later".to_string(),
            #[cfg(feature = "sqlx")]
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
