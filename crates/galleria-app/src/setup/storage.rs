//! Storage setup and initialization

use anyhow::{Context, Result};
use galleria_core::GalleriaConfig;
use galleria_storage::{create_storage, Storage};
use std::sync::Arc;

pub async fn setup_storage(config: &GalleriaConfig) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage abstraction...");
    let storage = create_storage(&config.storage)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(
        backend = ?storage.backend_type(),
        "Storage abstraction initialized successfully"
    );
    Ok(storage)
}
