//! Application setup and initialization

pub mod database;
pub mod services;
pub mod storage;

use anyhow::{Context, Result};
use galleria_core::GalleriaConfig;

use crate::context::AppContext;

/// Initialize telemetry, persistence and every pipeline component.
pub async fn initialize_app(config: &GalleriaConfig) -> Result<AppContext> {
    galleria_infra::init_telemetry(&config.telemetry)
        .context("Failed to initialize telemetry")?;

    tracing::info!(
        environment = %config.environment,
        "Configuration loaded and validated successfully"
    );

    let db_pool = match &config.database_url {
        Some(url) => Some(database::setup_database(config, url).await?),
        None => None,
    };

    let storage = storage::setup_storage(config).await?;

    services::initialize_services(config, db_pool, storage).await
}
