//! Galleria Services Layer
//!
//! Orchestration on top of the storage, processing and review crates:
//! - `IngestionCoordinator`: one upload from raw bytes (or a remote URL) to a
//!   stored, queued picture asset
//! - `PictureQueryService`: cached list and detail reads
//! - `RemoteFetcher`: guarded download of remote images

pub mod ingest;
pub mod query;
pub mod remote;

pub use ingest::{IngestOutcome, IngestRequest, IngestSource, IngestionCoordinator};
pub use query::PictureQueryService;
pub use remote::{validate_remote_url, RemoteFetcher, RemoteResource};
