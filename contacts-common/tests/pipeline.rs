use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use contacts_common::artifact::UploadArtifact;
use contacts_common::page::{fetch_page, PageRequest};
use contacts_common::pipeline::{Pipeline, PipelineError, Stage};
use contacts_common::record::ContactRecord;
use contacts_common::store::testing::RecordingStore;
use contacts_common::store::MemoryContactStore;

/// Write `contents` to a fresh artifact and return it with its path.
fn upload(contents: &str) -> (UploadArtifact, PathBuf) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    let artifact = UploadArtifact::from(file.into_temp_path());
    let path = artifact.path().to_path_buf();
    (artifact, path)
}

fn csv_of(rows: impl IntoIterator<Item = (String, String, String)>) -> String {
    let mut out = String::from("name,email,contact\n");
    for (name, email, contact) in rows {
        out.push_str(&format!("{name},{email},{contact}\n"));
    }
    out
}

fn numbered(n: usize, suffix: &str) -> String {
    csv_of((0..n).map(|i| {
        (
            format!("name{i}{suffix}"),
            format!("{i}@example.com"),
            format!("555-{i:04}{suffix}"),
        )
    }))
}

#[tokio::test]
async fn test_inserts_new_and_reconciles_known_contacts() {
    let store = Arc::new(MemoryContactStore::with_records(&[ContactRecord::new(
        "Old Ada",
        "ada@example.com",
        "000",
    )]));
    let pipeline = Pipeline::new(store.clone());
    let (artifact, path) = upload(
        "name,email,contact\n\
         Ada,ada@example.com,555-0100\n\
         Grace,grace@example.com,555-0101\n\
         ,nameless@example.com,555-0102\n",
    );

    let outcome = pipeline.submit(Some(artifact)).await.unwrap();

    assert_eq!(outcome.inserted, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(
        outcome.duplicates,
        vec![ContactRecord::new("Ada", "ada@example.com", "555-0100")]
    );
    assert_eq!(store.get("ada@example.com").unwrap().name, "Ada");
    assert!(store.get("grace@example.com").is_some());
    // Rejected rows appear nowhere.
    assert!(store.get("nameless@example.com").is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let store = Arc::new(MemoryContactStore::new());
    let pipeline = Pipeline::new(store.clone());
    let contents = numbered(25, "");

    let (first, _) = upload(&contents);
    let first = pipeline.submit(Some(first)).await.unwrap();
    let (second, _) = upload(&contents);
    let second = pipeline.submit(Some(second)).await.unwrap();

    assert_eq!(first.inserted, 25);
    assert_eq!(first.updated, 0);
    assert!(first.duplicates.is_empty());
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 25);
    assert_eq!(second.duplicates.len(), 25);
    assert_eq!(store.len(), 25);
}

#[tokio::test]
async fn test_write_chunks_at_batch_boundaries() {
    for (rows, expected_chunks) in [(2, vec![2]), (3, vec![2, 1]), (4, vec![2, 2])] {
        let store = Arc::new(RecordingStore::new(MemoryContactStore::new()));
        let pipeline = Pipeline::with_batch_size(store.clone(), 2);
        let (artifact, _) = upload(&numbered(rows, ""));

        let outcome = pipeline.submit(Some(artifact)).await.unwrap();

        assert_eq!(outcome.inserted, rows as u64);
        assert_eq!(store.insert_chunks(), expected_chunks);
    }
}

#[tokio::test]
async fn test_writing_is_skipped_when_nothing_is_new() {
    let existing: Vec<_> = (0..3)
        .map(|i| ContactRecord::new("old", format!("{i}@example.com"), "old"))
        .collect();
    let store = Arc::new(RecordingStore::new(MemoryContactStore::with_records(&existing)));
    let pipeline = Pipeline::with_batch_size(store.clone(), 2);
    let (artifact, _) = upload(&numbered(3, "-new"));

    let outcome = pipeline.submit(Some(artifact)).await.unwrap();

    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.updated, 3);
    assert!(store.insert_chunks().is_empty());
    assert_eq!(store.inner().get("2@example.com").unwrap().name, "name2-new");
}

#[tokio::test]
async fn test_partial_write_failure_keeps_earlier_chunks_and_cleans_up() {
    let store = Arc::new(RecordingStore::new(MemoryContactStore::new()).fail_insert_call(1));
    let pipeline = Pipeline::with_batch_size(store.clone(), 2);
    let (artifact, path) = upload(&numbered(6, ""));

    let err = pipeline.submit(Some(artifact)).await.unwrap_err();

    assert_eq!(err.stage(), Stage::Writing);
    match err {
        PipelineError::StorageWriteFailed(e) => assert_eq!(e.inserted, 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.insert_chunks(), vec![2, 2]);
    assert_eq!(store.inner().len(), 2);
    // Reconciliation never ran.
    assert_eq!(store.update_calls(), 0);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_update_failure_surfaces_with_insert_count() {
    let store = Arc::new(
        RecordingStore::new(MemoryContactStore::with_records(&[ContactRecord::new(
            "old",
            "1@example.com",
            "old",
        )]))
        .fail_update_for("1@example.com"),
    );
    let pipeline = Pipeline::new(store.clone());
    let (artifact, path) = upload(&numbered(3, ""));

    let err = pipeline.submit(Some(artifact)).await.unwrap_err();

    assert_eq!(err.stage(), Stage::Reconciling);
    match err {
        PipelineError::StorageUpdateFailed { inserted, error } => {
            assert_eq!(inserted, 2);
            assert_eq!(error.updated, 0);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!path.exists());
}

#[tokio::test]
async fn test_lookup_failure_aborts_before_writing() {
    let store = Arc::new(RecordingStore::new(MemoryContactStore::new()).fail_lookup());
    let pipeline = Pipeline::new(store.clone());
    let (artifact, path) = upload(&numbered(2, ""));

    let err = pipeline.submit(Some(artifact)).await.unwrap_err();

    assert!(matches!(err, PipelineError::StorageLookupFailed(_)));
    assert!(store.insert_chunks().is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_malformed_file_fails_parsing_and_cleans_up() {
    let store = Arc::new(MemoryContactStore::new());
    let pipeline = Pipeline::new(store.clone());
    let (artifact, path) = upload("name,email,contact\nAda,ada@example.com\n");

    let err = pipeline.submit(Some(artifact)).await.unwrap_err();

    assert!(matches!(err, PipelineError::FileParseFailed(_)));
    assert!(store.is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_repeated_new_email_is_inserted_with_last_value() {
    let store = Arc::new(MemoryContactStore::new());
    let pipeline = Pipeline::new(store.clone());
    let (artifact, _) = upload(
        "name,email,contact\n\
         First,dup@example.com,1\n\
         Other,other@example.com,2\n\
         Last,dup@example.com,3\n",
    );

    let outcome = pipeline.submit(Some(artifact)).await.unwrap();

    assert!(outcome.duplicates.is_empty());
    assert_eq!(store.len(), 2);
    let stored = store.get("dup@example.com").unwrap();
    assert_eq!(stored.name, "Last");
    assert_eq!(stored.contact, "3");
}

#[tokio::test]
async fn test_empty_file_succeeds_with_nothing_written() {
    let store = Arc::new(RecordingStore::new(MemoryContactStore::new()).fail_lookup());
    let pipeline = Pipeline::new(store.clone());
    let (artifact, _) = upload("name,email,contact\n");

    let outcome = pipeline.submit(Some(artifact)).await.unwrap();

    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.updated, 0);
    assert!(outcome.duplicates.is_empty());
}

#[tokio::test]
async fn test_submitted_contacts_can_be_paged() {
    let store = Arc::new(MemoryContactStore::new());
    let pipeline = Pipeline::new(store.clone());
    let (artifact, _) = upload(&numbered(15, ""));
    pipeline.submit(Some(artifact)).await.unwrap();

    let first = fetch_page(store.as_ref(), PageRequest::parse(Some("1"), Some("10")).unwrap())
        .await
        .unwrap();
    let second = fetch_page(store.as_ref(), PageRequest::parse(Some("2"), Some("10")).unwrap())
        .await
        .unwrap();

    assert_eq!((first.records.len(), first.total), (10, 15));
    assert_eq!((second.records.len(), second.total), (5, 15));
    assert_eq!(first.records[0].email, "0@example.com");
    assert_eq!(second.records[0].email, "10@example.com");
}
