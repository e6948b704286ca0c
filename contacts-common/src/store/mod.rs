pub mod memory;
pub mod postgres;
pub mod testing;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{ContactRecord, StoredContact};

pub use memory::MemoryContactStore;
pub use postgres::PgContactStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection-level errors (network, TLS, authentication)
    #[error("database connection error: {0}")]
    Connection(String),

    /// Query execution errors (SQL errors, constraint violations)
    #[error("database query error: {0}")]
    Query(String),

    /// Connection pool exhausted or closed
    #[error("database pool exhausted")]
    PoolExhausted,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for the `information` collection of contacts, keyed by email.
///
/// Implementations are handed to the pipeline and the page reader explicitly,
/// the caller owns their lifecycle.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Return the subset of `emails` already present in storage.
    async fn existing_emails(&self, emails: &[String]) -> StoreResult<HashSet<String>>;

    /// Insert `records` as one bulk operation and return the affected row count.
    /// When an email repeats, within the call or against earlier calls, the last value written wins.
    async fn insert_batch(&self, records: &[ContactRecord]) -> StoreResult<u64>;

    /// Overwrite `name` and `contact` of the row matching `record.email`.
    /// Returns 0 when no row has that email.
    async fn update_contact(&self, record: &ContactRecord) -> StoreResult<u64>;

    /// At most `limit` rows starting at `offset`, ordered by identity.
    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<StoredContact>>;

    async fn count(&self) -> StoreResult<i64>;
}
