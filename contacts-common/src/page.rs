use serde_derive::Serialize;
use thiserror::Error;

use crate::record::StoredContact;
use crate::store::{ContactStore, StoreError};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("page must be a positive integer, got {0:?}")]
    InvalidPage(String),
    #[error("limit must be a positive integer, got {0:?}")]
    InvalidLimit(String),
    #[error("requested window is out of range")]
    OutOfRange,
    #[error("failed to read contacts: {0}")]
    Storage(#[from] StoreError),
}

/// A validated, 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Result<Self, PageError> {
        if page == 0 {
            return Err(PageError::InvalidPage(page.to_string()));
        }
        if limit == 0 {
            return Err(PageError::InvalidLimit(limit.to_string()));
        }

        let request = Self { page, limit };
        // Reject windows the storage layer cannot address.
        request.offset()?;
        i64::try_from(limit).map_err(|_| PageError::OutOfRange)?;
        Ok(request)
    }

    /// Build a request from raw query values. Absent or blank values take the defaults;
    /// anything else must parse as a positive integer.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Result<Self, PageError> {
        let page =
            parse_positive(page, DEFAULT_PAGE).ok_or_else(|| raw(page, PageError::InvalidPage))?;
        let limit = parse_positive(limit, DEFAULT_LIMIT)
            .ok_or_else(|| raw(limit, PageError::InvalidLimit))?;
        Self::new(page, limit)
    }

    /// `(page - 1) * limit`, as storage expects it.
    pub fn offset(&self) -> Result<i64, PageError> {
        (self.page - 1)
            .checked_mul(self.limit)
            .and_then(|offset| i64::try_from(offset).ok())
            .ok_or(PageError::OutOfRange)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn parse_positive(value: Option<&str>, default: u64) -> Option<u64> {
    match value.map(str::trim) {
        None | Some("") => Some(default),
        Some(value) => value.parse::<u64>().ok().filter(|n| *n > 0),
    }
}

fn raw(value: Option<&str>, variant: fn(String) -> PageError) -> PageError {
    variant(value.unwrap_or_default().to_owned())
}

/// One window of the stored collection plus the size of the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub records: Vec<StoredContact>,
    pub total: i64,
}

impl Page {
    /// `ceil(total / limit)`.
    pub fn total_pages(&self, limit: u64) -> u64 {
        let total = u64::try_from(self.total).unwrap_or(0);
        total.div_ceil(limit.max(1))
    }
}

/// Read one page of contacts in identity order, plus the total row count.
/// Takes no locks, so concurrent submissions may be partially visible.
pub async fn fetch_page(store: &dyn ContactStore, request: PageRequest) -> Result<Page, PageError> {
    let offset = request.offset()?;
    let limit = i64::try_from(request.limit).map_err(|_| PageError::OutOfRange)?;

    let records = store.fetch_page(offset, limit).await?;
    let total = store.count().await?;

    Ok(Page { records, total })
}
