//! Orchestrates one submission: parse, classify, insert new contacts, reconcile known ones.
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_derive::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::artifact::UploadArtifact;
use crate::classify::{classify, Classification};
use crate::metrics::{SUBMISSIONS, SUBMIT_DURATION};
use crate::parse::{parse_contacts, ParseError};
use crate::reconcile::{ReconcileError, Reconciler};
use crate::record::ContactRecord;
use crate::store::{ContactStore, StoreError};
use crate::writer::{BulkWriter, WriteError};

/// Chunk size used by both the bulk writer and the reconciler.
pub const BATCH_SIZE: usize = 1000;

/// The stage a failed submission stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Receiving,
    Parsing,
    Classifying,
    Writing,
    Reconciling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Receiving => "receiving",
            Stage::Parsing => "parsing",
            Stage::Classifying => "classifying",
            Stage::Writing => "writing",
            Stage::Reconciling => "reconciling",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no file was provided")]
    NoFileProvided,
    #[error("failed to parse uploaded file: {0}")]
    FileParseFailed(#[from] ParseError),
    #[error("failed to look up existing emails: {0}")]
    StorageLookupFailed(#[source] StoreError),
    #[error(transparent)]
    StorageWriteFailed(#[from] WriteError),
    #[error("{error}")]
    StorageUpdateFailed {
        /// Rows inserted before reconciliation started.
        inserted: u64,
        #[source]
        error: ReconcileError,
    },
}

impl PipelineError {
    /// The stage the submission failed in.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::NoFileProvided => Stage::Receiving,
            PipelineError::FileParseFailed(_) => Stage::Parsing,
            PipelineError::StorageLookupFailed(_) => Stage::Classifying,
            PipelineError::StorageWriteFailed(_) => Stage::Writing,
            PipelineError::StorageUpdateFailed { .. } => Stage::Reconciling,
        }
    }
}

/// The result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub inserted: u64,
    pub updated: u64,
    /// Records whose email was already stored, with the values submitted in this batch.
    pub duplicates: Vec<ContactRecord>,
}

/// Runs submissions against an injected `ContactStore`.
pub struct Pipeline {
    store: Arc<dyn ContactStore>,
    batch_size: usize,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self::with_batch_size(store, BATCH_SIZE)
    }

    pub fn with_batch_size(store: Arc<dyn ContactStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest one uploaded file.
    ///
    /// The artifact is released before this returns, whatever the outcome. Storage
    /// failures abort the remaining stages; nothing already written is rolled back.
    pub async fn submit(
        &self,
        upload: Option<UploadArtifact>,
    ) -> Result<SubmitOutcome, PipelineError> {
        let start = Instant::now();

        let result = match upload {
            Some(artifact) => {
                let result = self.process(&artifact).await;
                artifact.release();
                result
            }
            None => Err(PipelineError::NoFileProvided),
        };

        let outcome = match &result {
            Ok(outcome) => {
                info!(
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    duplicates = outcome.duplicates.len(),
                    "submission complete"
                );
                "success"
            }
            Err(e) => {
                error!(stage = %e.stage(), "submission failed: {}", e);
                "failed"
            }
        };
        metrics::counter!(SUBMISSIONS, "outcome" => outcome).increment(1);
        metrics::histogram!(SUBMIT_DURATION).record(start.elapsed().as_secs_f64());

        result
    }

    async fn process(&self, artifact: &UploadArtifact) -> Result<SubmitOutcome, PipelineError> {
        let records = parse_contacts(artifact.path().to_path_buf()).await?;

        let Classification {
            new_records,
            duplicate_records,
        } = classify(self.store.as_ref(), records)
            .await
            .map_err(PipelineError::StorageLookupFailed)?;

        let inserted = if new_records.is_empty() {
            0
        } else {
            BulkWriter::new(self.store.as_ref(), self.batch_size)
                .write(&new_records)
                .await?
        };

        let updated = Reconciler::new(self.store.as_ref(), self.batch_size)
            .reconcile(&duplicate_records)
            .await
            .map_err(|error| PipelineError::StorageUpdateFailed { inserted, error })?;

        Ok(SubmitOutcome {
            inserted,
            updated,
            duplicates: duplicate_records,
        })
    }
}
