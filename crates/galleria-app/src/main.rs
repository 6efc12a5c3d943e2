//! Galleria: picture ingestion and automated review.
//!
//! Configuration comes from the environment (see `GalleriaConfig::from_env`).
//! `run` drives the moderation worker until interrupted; the other commands
//! perform a single operation and exit. Reviews queued by a one-shot command
//! are persisted to the overflow store on exit and picked up by `run`.

mod context;
mod setup;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use galleria_core::{GalleriaConfig, ModerationStatus, PictureAsset, PictureQuery};
use galleria_services::{IngestOutcome, IngestRequest, IngestSource};
use serde_json::json;
use uuid::Uuid;

use crate::context::AppContext;

#[derive(Parser)]
#[command(name = "galleria", about = "Gallery picture ingestion and review pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the moderation worker until Ctrl+C or SIGTERM
    Run,
    /// Ingest a local image file
    Ingest {
        /// Path to the image
        file: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Ingest an image from a URL
    IngestUrl {
        /// URL of the image to download
        url: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List pictures
    List {
        #[arg(long)]
        owner: Option<Uuid>,
        #[arg(long)]
        space: Option<Uuid>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Case-insensitive substring of the picture name
        #[arg(long)]
        name: Option<String>,
        /// Only approved pictures, newest first
        #[arg(long, conflicts_with_all = ["owner", "space", "status", "name"])]
        public: bool,
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Show a single picture
    Get {
        /// Picture UUID
        id: Uuid,
    },
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Uploading user
    #[arg(long)]
    owner: Uuid,
    #[arg(long)]
    space: Option<Uuid>,
    /// Display name; defaults to the file name
    #[arg(long)]
    name: Option<String>,
    /// Replace the content of this existing picture
    #[arg(long)]
    target: Option<Uuid>,
    /// Skip automated review
    #[arg(long)]
    trusted: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Approved,
    Rejected,
}

impl From<StatusArg> for ModerationStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => ModerationStatus::Pending,
            StatusArg::Approved => ModerationStatus::Approved,
            StatusArg::Rejected => ModerationStatus::Rejected,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = GalleriaConfig::from_env()?;
    let ctx = setup::initialize_app(&config).await?;

    let result = execute(cli.command, &ctx).await;
    ctx.shutdown().await;
    result
}

async fn execute(command: Commands, ctx: &AppContext) -> Result<(), anyhow::Error> {
    match command {
        Commands::Run => run_worker(ctx).await,
        Commands::Ingest { file, target } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            let content_type = content_type_for(&file);
            let request = target.into_request(
                IngestSource::Bytes(bytes.into()),
                filename,
                content_type.to_string(),
            );
            let outcome = ctx.coordinator.ingest(request).await?;
            print_json(&outcome_json(&outcome))
        }
        Commands::IngestUrl { url, target } => {
            let filename = url
                .rsplit('/')
                .next()
                .map(|segment| segment.split(['?', '#']).next().unwrap_or(segment))
                .filter(|segment| !segment.is_empty())
                .unwrap_or("remote")
                .to_string();
            let content_type = content_type_for(Path::new(&filename));
            let request = target.into_request(
                IngestSource::RemoteUrl(url),
                filename,
                content_type.to_string(),
            );
            let outcome = ctx.coordinator.ingest(request).await?;
            print_json(&outcome_json(&outcome))
        }
        Commands::List {
            owner,
            space,
            status,
            name,
            public,
            limit,
            offset,
        } => {
            let pictures: Vec<PictureAsset> = if public {
                ctx.query.public_gallery(limit, offset).await?
            } else {
                ctx.query
                    .list(PictureQuery {
                        owner_id: owner,
                        space_id: space,
                        status: status.map(ModerationStatus::from),
                        name_contains: name,
                        limit,
                        offset,
                    })
                    .await?
            };
            print_json(&json!({ "count": pictures.len(), "pictures": pictures }))
        }
        Commands::Get { id } => {
            let picture = ctx.query.get(id).await?;
            print_json(&picture)
        }
    }
}

impl TargetArgs {
    fn into_request(self, source: IngestSource, filename: String, content_type: String) -> IngestRequest {
        IngestRequest {
            source,
            filename,
            content_type,
            owner_id: self.owner,
            target_id: self.target,
            space_id: self.space,
            name: self.name,
            trusted: self.trusted,
        }
    }
}

async fn run_worker(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let handle = match &ctx.worker {
        Some(worker) => Some(worker.clone().start()),
        None => {
            tracing::warn!("No moderation worker configured, waiting for shutdown only");
            None
        }
    };

    shutdown_signal().await;

    if let Some(worker) = &ctx.worker {
        worker.shutdown().await;
    }
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Moderation worker task failed");
        }
    }
    Ok(())
}

/// Wait for Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn outcome_json(outcome: &IngestOutcome) -> serde_json::Value {
    json!({
        "picture": outcome.asset,
        "deduplicated": outcome.deduplicated,
        "queued": outcome.queued.map(|source| format!("{:?}", source).to_lowercase()),
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), anyhow::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
