//! Per-derivative units of an upload and the barrier that joins them.

use std::sync::Arc;

use bytes::Bytes;
use galleria_core::{AppError, Derivative, DerivativeKind, ErrorMetadata};
use galleria_processing::{DerivativeGenerator, DerivativeNamer, SourceImage};
use galleria_storage::{picture_storage_key, Storage, StorageScope};
use tokio::task::JoinHandle;

/// A derivative generated and written to storage.
#[derive(Debug, Clone)]
pub(crate) struct StoredUnit {
    pub kind: DerivativeKind,
    pub derivative: Derivative,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub(crate) struct UnitFailure {
    pub kind: DerivativeKind,
    pub attempts: u32,
    pub message: String,
}

pub(crate) type UnitResult = Result<StoredUnit, UnitFailure>;

/// Generate one derivative and write it, retrying recoverable failures.
pub(crate) struct DerivativeUnit {
    pub kind: DerivativeKind,
    pub source: Arc<SourceImage>,
    pub generator: DerivativeGenerator,
    pub storage: Arc<dyn Storage>,
    pub namer: DerivativeNamer,
    pub scope: StorageScope,
    pub retries: u32,
}

impl DerivativeUnit {
    pub async fn run(self) -> UnitResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt().await {
                Ok(stored) => return Ok(stored),
                Err(e) if attempt <= self.retries && e.is_recoverable() => {
                    tracing::warn!(
                        kind = %self.kind,
                        attempt,
                        error = %e,
                        "Derivative unit failed, retrying"
                    );
                }
                Err(e) => {
                    return Err(UnitFailure {
                        kind: self.kind,
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    async fn attempt(&self) -> Result<StoredUnit, AppError> {
        let generator = self.generator.clone();
        let source = self.source.clone();
        let kind = self.kind;
        let encoded = tokio::task::spawn_blocking(move || generator.generate(kind, &source))
            .await
            .map_err(|e| AppError::Internal(format!("Derivative task panicked: {}", e)))??;

        let storage_key =
            picture_storage_key(self.scope, &self.namer.file_name(kind, &encoded.extension));
        let url = self
            .storage
            .put(&storage_key, encoded.bytes.clone(), &encoded.content_type)
            .await?;

        Ok(StoredUnit {
            kind,
            derivative: Derivative {
                url,
                storage_path: storage_key,
                format: encoded.extension,
            },
            bytes: encoded.bytes,
        })
    }
}

/// Results of every unit of one upload.
#[derive(Debug, Default)]
pub(crate) struct FanOut {
    pub stored: Vec<StoredUnit>,
    pub failed: Vec<UnitFailure>,
}

impl FanOut {
    pub fn take(&mut self, kind: DerivativeKind) -> Option<StoredUnit> {
        let index = self.stored.iter().position(|unit| unit.kind == kind)?;
        Some(self.stored.swap_remove(index))
    }

    pub fn failure_error(&self) -> AppError {
        AppError::PartialFailure {
            failed_units: self
                .failed
                .iter()
                .map(|failure| failure.kind.to_string())
                .collect(),
            message: self
                .failed
                .iter()
                .map(|failure| {
                    format!(
                        "{} after {} attempt(s): {}",
                        failure.kind, failure.attempts, failure.message
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Wait for every unit; a panicked unit counts as failed.
pub(crate) async fn join_units(handles: Vec<(DerivativeKind, JoinHandle<UnitResult>)>) -> FanOut {
    let results = futures::future::join_all(handles.into_iter().map(|(kind, handle)| async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(UnitFailure {
                kind,
                attempts: 1,
                message: format!("unit task failed: {}", e),
            }),
        }
    }))
    .await;

    let mut fan_out = FanOut::default();
    for result in results {
        match result {
            Ok(stored) => fan_out.stored.push(stored),
            Err(failure) => fan_out.failed.push(failure),
        }
    }
    fan_out
}
