//! Review task error types
//!
//! A moderation attempt either ends with a terminal decision or with a
//! `TaskError`. Recoverable errors release the task for a later scheduler tick;
//! unrecoverable ones drop it from the queue.

use std::fmt;

use crate::error::{AppError, ErrorMetadata};

#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// The task is dropped without another attempt (e.g. its asset was deleted).
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// The task is released and retried on a later tick (e.g. poll timeout).
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    /// Default conversion from anyhow::Error creates a recoverable error
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

impl From<AppError> for TaskError {
    /// Recoverability follows the error's own metadata.
    fn from(err: AppError) -> Self {
        let recoverable = err.is_recoverable();
        Self {
            inner: err.into(),
            recoverable,
        }
    }
}

/// Extension trait for Result to easily create unrecoverable task errors
pub trait TaskResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_error() {
        let err = TaskError::unrecoverable(anyhow::anyhow!("picture deleted"));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("picture deleted"));
    }

    #[test]
    fn test_from_app_error_follows_metadata() {
        let timeout: TaskError = AppError::Timeout("moderation poll".to_string()).into();
        assert!(timeout.is_recoverable());

        let missing: TaskError = AppError::NotFound("picture".to_string()).into();
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn test_from_anyhow_defaults_to_recoverable() {
        let err: TaskError = anyhow::anyhow!("flaky network").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("bad image url"));
        let task_result = result.unrecoverable();
        assert!(!task_result.unwrap_err().is_recoverable());
    }
}
