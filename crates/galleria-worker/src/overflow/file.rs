use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::memory::OverflowState;
use super::{OverflowError, OverflowStore};

const STATE_FILE: &str = "overflow.json";

/// Overflow store persisted as a single JSON document.
///
/// Every mutation rewrites the document to a temporary file, syncs it and
/// renames it over the previous one, so a crash leaves either the old or the
/// new state on disk.
pub struct FileOverflowStore {
    path: PathBuf,
    state: Mutex<OverflowState>,
}

impl FileOverflowStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, OverflowError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(STATE_FILE);

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OverflowState::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            pending = state.lists.values().map(Vec::len).sum::<usize>(),
            "Overflow store opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &OverflowState) -> Result<(), OverflowError> {
        let bytes = serde_json::to_vec(state)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Apply `mutate` to a copy of the state and commit it only once it is on disk.
    async fn update<R>(
        &self,
        mutate: impl FnOnce(&mut OverflowState) -> R,
    ) -> Result<R, OverflowError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let result = mutate(&mut next);
        self.persist(&next).await?;
        *state = next;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl OverflowStore for FileOverflowStore {
    async fn get(&self, key: &str) -> Result<Option<String>, OverflowError> {
        Ok(self.state.lock().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), OverflowError> {
        self.update(|state| {
            state.values.insert(key.to_string(), value);
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, OverflowError> {
        if !self.state.lock().await.values.contains_key(key) {
            return Ok(false);
        }
        self.update(|state| state.values.remove(key).is_some()).await
    }

    async fn list_range(&self, list: &str) -> Result<Vec<String>, OverflowError> {
        Ok(self
            .state
            .lock()
            .await
            .lists
            .get(list)
            .cloned()
            .unwrap_or_default())
    }

    async fn compare_and_swap_list(
        &self,
        list: &str,
        expected: &[String],
        new: Vec<String>,
    ) -> Result<bool, OverflowError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        if !next.compare_and_swap(list, expected, new) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }
}
