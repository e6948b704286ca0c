use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ContactStore, StoreResult};
use crate::record::{ContactRecord, StoredContact};

/// In-process `ContactStore` with the same write semantics as `PgContactStore`:
/// identities are assigned on first insert and a repeated email keeps the last value.
#[derive(Default)]
pub struct MemoryContactStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    rows: BTreeMap<i64, StoredContact>,
    ids_by_email: HashMap<String, i64>,
}

impl MemoryState {
    fn upsert(&mut self, record: &ContactRecord) {
        if let Some(id) = self.ids_by_email.get(&record.email) {
            if let Some(row) = self.rows.get_mut(id) {
                row.name.clone_from(&record.name);
                row.contact.clone_from(&record.contact);
            }
            return;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.ids_by_email.insert(record.email.clone(), id);
        self.rows.insert(
            id,
            StoredContact {
                id,
                name: record.name.clone(),
                email: record.email.clone(),
                contact: record.contact.clone(),
            },
        );
    }
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store already holding `records`, inserted in order.
    pub fn with_records(records: &[ContactRecord]) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for record in records {
                state.upsert(record);
            }
        }
        store
    }

    pub fn get(&self, email: &str) -> Option<StoredContact> {
        let state = self.lock();
        state
            .ids_by_email
            .get(email)
            .and_then(|id| state.rows.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave a row half written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn existing_emails(&self, emails: &[String]) -> StoreResult<HashSet<String>> {
        let state = self.lock();
        Ok(emails
            .iter()
            .filter(|email| state.ids_by_email.contains_key(*email))
            .cloned()
            .collect())
    }

    async fn insert_batch(&self, records: &[ContactRecord]) -> StoreResult<u64> {
        let mut state = self.lock();
        let mut touched = HashSet::with_capacity(records.len());
        for record in records {
            state.upsert(record);
            touched.insert(record.email.as_str());
        }
        Ok(touched.len() as u64)
    }

    async fn update_contact(&self, record: &ContactRecord) -> StoreResult<u64> {
        let mut state = self.lock();
        let Some(id) = state.ids_by_email.get(&record.email).copied() else {
            return Ok(0);
        };

        match state.rows.get_mut(&id) {
            Some(row) => {
                row.name.clone_from(&record.name);
                row.contact.clone_from(&record.contact);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<StoredContact>> {
        let state = self.lock();
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.rows.values().skip(offset).take(limit).cloned().collect())
    }

    async fn count(&self) -> StoreResult<i64> {
        Ok(self.lock().rows.len() as i64)
    }
}
