use std::collections::HashSet;

use tracing::debug;

use crate::record::ContactRecord;
use crate::store::{ContactStore, StoreResult};

/// An upload batch split by whether each record's email is already stored.
/// Every input record lands in exactly one of the two sets, in input order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Classification {
    pub new_records: Vec<ContactRecord>,
    pub duplicate_records: Vec<ContactRecord>,
}

/// Partition `batch` with a single existence lookup against `store`.
///
/// Records sharing an email are classified identically. Emails repeated within the
/// batch but absent from storage all count as new; the write order settles the final value.
pub async fn classify(
    store: &dyn ContactStore,
    batch: Vec<ContactRecord>,
) -> StoreResult<Classification> {
    if batch.is_empty() {
        return Ok(Classification::default());
    }

    let candidates: Vec<String> = batch
        .iter()
        .map(|record| record.email.as_str())
        .collect::<HashSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect();

    let existing = store.existing_emails(&candidates).await?;

    let (duplicate_records, new_records): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .partition(|record| existing.contains(&record.email));

    debug!(
        new = new_records.len(),
        duplicates = duplicate_records.len(),
        "classified upload batch"
    );

    Ok(Classification {
        new_records,
        duplicate_records,
    })
}
