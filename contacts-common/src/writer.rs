use thiserror::Error;
use tracing::{debug, error};

use crate::metrics::{INSERT_CHUNKS, RECORDS_INSERTED};
use crate::record::ContactRecord;
use crate::store::{ContactStore, StoreError};

/// A chunk insert failed. Chunks before it stay in storage.
#[derive(Error, Debug)]
#[error("bulk insert of chunk {chunk} failed after {inserted} rows were inserted: {source}")]
pub struct WriteError {
    /// Rows inserted by the chunks that completed before the failure.
    pub inserted: u64,
    /// 0-based index of the failed chunk.
    pub chunk: usize,
    #[source]
    pub source: StoreError,
}

/// Persists new records in consecutive chunks of at most `batch_size`, one bulk insert per chunk.
pub struct BulkWriter<'s> {
    store: &'s dyn ContactStore,
    batch_size: usize,
}

impl<'s> BulkWriter<'s> {
    pub fn new(store: &'s dyn ContactStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Insert `records` chunk by chunk, in order, and return the affected row count
    /// reported by storage. Chunk `i + 1` is only issued once chunk `i` has completed.
    pub async fn write(&self, records: &[ContactRecord]) -> Result<u64, WriteError> {
        let mut inserted = 0;

        for (chunk, batch) in records.chunks(self.batch_size).enumerate() {
            let affected = self.store.insert_batch(batch).await.map_err(|source| {
                error!(chunk, inserted, "error inserting records: {}", source);
                WriteError {
                    inserted,
                    chunk,
                    source,
                }
            })?;

            metrics::counter!(INSERT_CHUNKS).increment(1);
            metrics::counter!(RECORDS_INSERTED).increment(affected);
            inserted += affected;
            debug!(chunk, size = batch.len(), affected, "inserted chunk");
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingStore;
    use crate::store::MemoryContactStore;

    fn records(n: usize) -> Vec<ContactRecord> {
        (0..n)
            .map(|i| ContactRecord::new(format!("name{i}"), format!("{i}@example.com"), "c"))
            .collect()
    }

    #[tokio::test]
    async fn test_chunk_count_at_batch_boundaries() {
        for (n, expected_chunks) in [(2, vec![2]), (3, vec![2, 1]), (4, vec![2, 2])] {
            let store = RecordingStore::new(MemoryContactStore::new());
            let writer = BulkWriter::new(&store, 2);

            let inserted = writer.write(&records(n)).await.unwrap();

            assert_eq!(inserted, n as u64);
            assert_eq!(store.insert_chunks(), expected_chunks);
        }
    }

    #[tokio::test]
    async fn test_failure_stops_and_reports_prior_progress() {
        let store = RecordingStore::new(MemoryContactStore::new()).fail_insert_call(1);
        let writer = BulkWriter::new(&store, 2);

        let err = writer.write(&records(6)).await.unwrap_err();

        assert_eq!(err.inserted, 2);
        assert_eq!(err.chunk, 1);
        // The third chunk is never issued.
        assert_eq!(store.insert_chunks(), vec![2, 2]);
        assert_eq!(store.inner().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_treated_as_one() {
        let store = RecordingStore::new(MemoryContactStore::new());
        let writer = BulkWriter::new(&store, 0);

        writer.write(&records(2)).await.unwrap();

        assert_eq!(store.insert_chunks(), vec![1, 1]);
    }
}
