use galleria_core::AppError;

use crate::validator::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode {format}: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Decode(msg) => AppError::Validation(format!("Unreadable image: {}", msg)),
            ProcessingError::Validation(inner) => AppError::Validation(inner.to_string()),
            ProcessingError::UnsupportedFormat(format) => {
                AppError::Validation(format!("Unsupported output format: {}", format))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
