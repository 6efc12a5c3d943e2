use galleria_core::TelemetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with an env filter and a text or JSON fmt layer.
///
/// `RUST_LOG` wins over the configured filter when both are present.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| "galleria=info".into());

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    tracing::info!(json_logs = config.json_logs, "Telemetry initialized");
    Ok(())
}
