use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::{ROWS_PARSED, ROWS_REJECTED};
use crate::record::{ContactRecord, RawRow, REQUIRED_COLUMNS};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to open upload: {0}")]
    Io(#[from] io::Error),
    #[error("malformed delimited file: {0}")]
    Csv(#[from] csv::Error),
    #[error("parsing task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Stream the file at `path` through the validator on the blocking pool,
/// keeping only the rows that become `ContactRecord`s.
pub async fn parse_contacts(path: PathBuf) -> Result<Vec<ContactRecord>, ParseError> {
    tokio::task::spawn_blocking(move || {
        let file = File::open(&path)?;
        read_contacts(BufReader::new(file))
    })
    .await?
}

/// Decode a delimited stream with a header row into valid contacts.
/// Rows failing validation are dropped; a malformed stream is an error.
pub fn read_contacts<R: Read>(reader: R) -> Result<Vec<ContactRecord>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = reader.headers()?;
    let missing: Vec<_> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "upload header lacks required columns, every row will be dropped");
    }

    let mut records = Vec::new();
    let mut parsed = 0u64;
    for row in reader.deserialize::<RawRow>() {
        let row = row?;
        parsed += 1;
        if let Some(record) = ContactRecord::from_row(&row) {
            records.push(record);
        }
    }

    let rejected = parsed - records.len() as u64;
    metrics::counter!(ROWS_PARSED).increment(parsed);
    metrics::counter!(ROWS_REJECTED).increment(rejected);
    info!(parsed, rejected, valid = records.len(), "parsed upload");

    Ok(records)
}
