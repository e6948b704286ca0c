//! A `ContactStore` wrapper that records how it was called and fails on demand.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContactStore, MemoryContactStore, StoreError, StoreResult};
use crate::record::{ContactRecord, StoredContact};

#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryContactStore,
    fail_lookup: bool,
    fail_insert_call: Option<usize>,
    fail_update_email: Option<String>,
    update_delays: HashMap<String, Duration>,
    insert_chunks: Mutex<Vec<usize>>,
    update_calls: AtomicUsize,
    updates_in_flight: AtomicUsize,
    max_updates_in_flight: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: MemoryContactStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// Fail every existence lookup.
    pub fn fail_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    /// Fail the nth (0-based) call to `insert_batch`, leaving earlier calls applied.
    pub fn fail_insert_call(mut self, call: usize) -> Self {
        self.fail_insert_call = Some(call);
        self
    }

    /// Fail any update targeting `email`.
    pub fn fail_update_for(mut self, email: &str) -> Self {
        self.fail_update_email = Some(email.to_owned());
        self
    }

    /// Hold any update carrying `name` for `delay` before applying it.
    pub fn delay_update_named(mut self, name: &str, delay: Duration) -> Self {
        self.update_delays.insert(name.to_owned(), delay);
        self
    }

    pub fn inner(&self) -> &MemoryContactStore {
        &self.inner
    }

    /// Sizes of every `insert_batch` call, including a failed one.
    pub fn insert_chunks(&self) -> Vec<usize> {
        self.insert_chunks
            .lock()
            .map(|chunks| chunks.clone())
            .unwrap_or_default()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// The largest number of updates observed in flight at the same time.
    pub fn max_updates_in_flight(&self) -> usize {
        self.max_updates_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContactStore for RecordingStore {
    async fn existing_emails(&self, emails: &[String]) -> StoreResult<HashSet<String>> {
        if self.fail_lookup {
            return Err(StoreError::Query("lookup failed".to_owned()));
        }
        self.inner.existing_emails(emails).await
    }

    async fn insert_batch(&self, records: &[ContactRecord]) -> StoreResult<u64> {
        let call = {
            let mut chunks = self
                .insert_chunks
                .lock()
                .map_err(|_| StoreError::Query("insert log poisoned".to_owned()))?;
            chunks.push(records.len());
            chunks.len() - 1
        };

        if self.fail_insert_call == Some(call) {
            return Err(StoreError::Query(format!("insert call {call} failed")));
        }
        self.inner.insert_batch(records).await
    }

    async fn update_contact(&self, record: &ContactRecord) -> StoreResult<u64> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.updates_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_updates_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        // Give every other update in the chunk a chance to start.
        tokio::task::yield_now().await;
        if let Some(delay) = self.update_delays.get(&record.name) {
            tokio::time::sleep(*delay).await;
        }

        let result = if self.fail_update_email.as_deref() == Some(record.email.as_str()) {
            Err(StoreError::Query(format!("update of {} failed", record.email)))
        } else {
            self.inner.update_contact(record).await
        };

        self.updates_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<StoredContact>> {
        self.inner.fetch_page(offset, limit).await
    }

    async fn count(&self) -> StoreResult<i64> {
        self.inner.count().await
    }
}
