//! Overflow store
//!
//! Durable key/value and list storage behind the review queue. Lists are only
//! ever rewritten through `compare_and_swap_list`, which is what lets several
//! workers claim entries without a lock of their own.

pub mod file;
pub mod memory;

pub use file::FileOverflowStore;
pub use memory::MemoryOverflowStore;

use galleria_core::AppError;

#[derive(Debug, thiserror::Error)]
pub enum OverflowError {
    #[error("Overflow store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Overflow store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Overflow store backend error: {0}")]
    Backend(String),
}

impl From<OverflowError> for AppError {
    fn from(err: OverflowError) -> Self {
        AppError::dependency("overflow-store", err.to_string())
    }
}

#[async_trait::async_trait]
pub trait OverflowStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, OverflowError>;

    async fn set(&self, key: &str, value: String) -> Result<(), OverflowError>;

    /// Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool, OverflowError>;

    /// Whole list in insertion order; missing lists are empty.
    async fn list_range(&self, list: &str) -> Result<Vec<String>, OverflowError>;

    /// Replace `list` with `new` only if it currently equals `expected`.
    async fn compare_and_swap_list(
        &self,
        list: &str,
        expected: &[String],
        new: Vec<String>,
    ) -> Result<bool, OverflowError>;
}
