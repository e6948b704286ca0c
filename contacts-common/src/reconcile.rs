use std::collections::hash_map::Entry;
use std::collections::HashMap;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error};

use crate::metrics::{RECORDS_UPDATED, UPDATE_CHUNKS};
use crate::record::ContactRecord;
use crate::store::{ContactStore, StoreError};

/// An update in a chunk failed, so the chunk counts as failed and no later chunk is issued.
#[derive(Error, Debug)]
#[error("update of chunk {chunk} failed after {updated} rows were updated: {source}")]
pub struct ReconcileError {
    /// Rows updated by chunks that completed before the failed one.
    pub updated: u64,
    /// Rows the failed chunk still managed to update before it was abandoned.
    pub updated_in_failed_chunk: u64,
    /// 0-based index of the failed chunk.
    pub chunk: usize,
    #[source]
    pub source: StoreError,
}

/// Overwrites `name` and `contact` of already-stored contacts.
///
/// Chunks run one after the other. Inside a chunk, updates to different emails are in
/// flight together while repeats of one email are applied in submitted order, so the last
/// occurrence wins.
pub struct Reconciler<'s> {
    store: &'s dyn ContactStore,
    batch_size: usize,
}

impl<'s> Reconciler<'s> {
    pub fn new(store: &'s dyn ContactStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Apply one update per record and return the total affected row count.
    /// An update matching no stored row affects nothing and is not an error.
    pub async fn reconcile(&self, records: &[ContactRecord]) -> Result<u64, ReconcileError> {
        let mut updated = 0;

        for (chunk, batch) in records.chunks(self.batch_size).enumerate() {
            let groups = group_by_email(batch);
            let results = join_all(groups.iter().map(|group| self.update_in_order(group))).await;

            let mut chunk_updated = 0;
            let mut first_error = None;
            for (affected, result) in results {
                chunk_updated += affected;
                match result {
                    Ok(()) => {}
                    Err(e) if first_error.is_none() => first_error = Some(e),
                    Err(e) => error!(chunk, "additional update failure in chunk: {}", e),
                }
            }

            if let Some(source) = first_error {
                error!(chunk, updated, "error updating records: {}", source);
                return Err(ReconcileError {
                    updated,
                    updated_in_failed_chunk: chunk_updated,
                    chunk,
                    source,
                });
            }

            metrics::counter!(UPDATE_CHUNKS).increment(1);
            metrics::counter!(RECORDS_UPDATED).increment(chunk_updated);
            updated += chunk_updated;
            debug!(chunk, size = batch.len(), affected = chunk_updated, "updated chunk");
        }

        Ok(updated)
    }

    /// Apply `group` one record at a time, stopping at the first failure.
    async fn update_in_order(&self, group: &[&ContactRecord]) -> (u64, Result<(), StoreError>) {
        let mut affected = 0;
        for record in group {
            match self.store.update_contact(record).await {
                Ok(rows) => affected += rows,
                Err(e) => return (affected, Err(e)),
            }
        }
        (affected, Ok(()))
    }
}

/// Split `batch` by email, keeping first-seen order across groups and input order within one.
fn group_by_email(batch: &[ContactRecord]) -> Vec<Vec<&ContactRecord>> {
    let mut groups: Vec<Vec<&ContactRecord>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in batch {
        match index.entry(record.email.as_str()) {
            Entry::Occupied(slot) => groups[*slot.get()].push(record),
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(vec![record]);
            }
        }
    }

    groups
}
