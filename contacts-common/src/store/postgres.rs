use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use super::{ContactStore, StoreError, StoreResult};
use crate::metrics::DB_QUERY_DURATION;
use crate::record::{ContactRecord, StoredContact};

/// Postgres implementation of `ContactStore`, backed by the `information` table.
pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize a new store with its own connection pool.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, Clone, FromRow)]
struct ContactRow {
    id: i64,
    name: String,
    email: String,
    contact: String,
}

impl From<ContactRow> for StoredContact {
    fn from(row: ContactRow) -> Self {
        StoredContact {
            id: row.id,
            name: row.name,
            email: row.email,
            contact: row.contact,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::PoolExhausted,

            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::Connection(err.to_string()),

            _ => StoreError::Query(err.to_string()),
        }
    }
}

fn record_query_duration(operation: &'static str, start: Instant) {
    metrics::histogram!(DB_QUERY_DURATION, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

/// Split `records` into column arrays, keeping only the last occurrence of each email.
/// Postgres refuses to update the same row twice in one `ON CONFLICT DO UPDATE` statement.
fn last_write_columns(records: &[ContactRecord]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut seen = HashSet::with_capacity(records.len());
    let mut names = Vec::with_capacity(records.len());
    let mut emails = Vec::with_capacity(records.len());
    let mut contacts = Vec::with_capacity(records.len());

    for record in records.iter().rev() {
        if seen.insert(record.email.as_str()) {
            names.push(record.name.clone());
            emails.push(record.email.clone());
            contacts.push(record.contact.clone());
        }
    }

    names.reverse();
    emails.reverse();
    contacts.reverse();
    (names, emails, contacts)
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn existing_emails(&self, emails: &[String]) -> StoreResult<HashSet<String>> {
        if emails.is_empty() {
            return Ok(HashSet::new());
        }

        let start = Instant::now();
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT email FROM information WHERE email = ANY($1)")
                .bind(emails)
                .fetch_all(&self.pool)
                .await?;
        record_query_duration("existing_emails", start);

        Ok(rows.into_iter().collect())
    }

    async fn insert_batch(&self, records: &[ContactRecord]) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let (names, emails, contacts) = last_write_columns(records);

        let start = Instant::now();
        let result = sqlx::query(
            r#"
INSERT INTO information (name, email, contact)
SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
ON CONFLICT (email) DO UPDATE
SET
    name = EXCLUDED.name,
    contact = EXCLUDED.contact
            "#,
        )
        .bind(&names)
        .bind(&emails)
        .bind(&contacts)
        .execute(&self.pool)
        .await?;
        record_query_duration("insert_batch", start);

        Ok(result.rows_affected())
    }

    async fn update_contact(&self, record: &ContactRecord) -> StoreResult<u64> {
        let start = Instant::now();
        let result = sqlx::query("UPDATE information SET name = $1, contact = $2 WHERE email = $3")
            .bind(&record.name)
            .bind(&record.contact)
            .bind(&record.email)
            .execute(&self.pool)
            .await?;
        record_query_duration("update_contact", start);

        Ok(result.rows_affected())
    }

    async fn fetch_page(&self, offset: i64, limit: i64) -> StoreResult<Vec<StoredContact>> {
        let start = Instant::now();
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
SELECT id, name, email, contact
FROM information
ORDER BY id
LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        record_query_duration("fetch_page", start);

        Ok(rows.into_iter().map(StoredContact::from).collect())
    }

    async fn count(&self) -> StoreResult<i64> {
        let start = Instant::now();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM information")
            .fetch_one(&self.pool)
            .await?;
        record_query_duration("count", start);

        Ok(total)
    }
}
