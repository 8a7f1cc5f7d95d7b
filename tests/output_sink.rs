use keywarden::managers::sink::{BlobStore, FsBlobStore, OutputSink};
use keywarden::services::logger::Logger;
use std::sync::Arc;
use uuid::Uuid;

fn store() -> (FsBlobStore, std::path::PathBuf) {
    let root = std::env::temp_dir().join(format!("keywarden-sink-{}", Uuid::new_v4()));
    (
        FsBlobStore::new(Logger::new("test"), root.clone(), "keywarden"),
        root,
    )
}

#[tokio::test]
async fn put_stores_text_and_returns_the_location() {
    let (store, root) = store();
    let location = store.put("tasks/t1/output.txt", "hello").await.unwrap();
    assert_eq!(location, "keywarden/tasks/t1/output.txt");
    let written = std::fs::read_to_string(root.join(&location)).unwrap();
    assert_eq!(written, "hello");
}

#[tokio::test]
async fn ensure_bucket_tolerates_an_existing_bucket() {
    let (store, _root) = store();
    store.ensure_bucket().await.unwrap();
    store.ensure_bucket().await.unwrap();
}

#[tokio::test]
async fn put_overwrites_an_existing_key() {
    let (store, root) = store();
    store.put("k.txt", "first").await.unwrap();
    let location = store.put("k.txt", "second").await.unwrap();
    assert_eq!(std::fs::read_to_string(root.join(&location)).unwrap(), "second");
}

#[tokio::test]
async fn archive_goes_through_the_configured_store() {
    let (store, root) = store();
    let sink = OutputSink::new(Logger::new("test"), Arc::new(store));
    let location = sink.archive("platforms/p1/snap.txt", "key material").await.unwrap();
    assert_eq!(
        std::fs::read_to_string(root.join(&location)).unwrap(),
        "key material"
    );
}

#[test]
fn needs_archive_uses_the_combined_size_boundary() {
    let just_under = "a".repeat(10_000);
    assert!(!OutputSink::needs_archive(&just_under, ""));
    let just_over = "a".repeat(10_001);
    assert!(OutputSink::needs_archive(&just_over, ""));
    // the boundary applies to the combined streams
    assert!(OutputSink::needs_archive(
        &"a".repeat(6_000),
        &"b".repeat(6_000)
    ));
}

#[test]
fn combined_document_delimits_all_three_sections() {
    let document = OutputSink::combined_document("out", "err", 7);
    assert_eq!(
        document,
        "=== STDOUT ===\nout\n\n=== STDERR ===\nerr\n\n=== EXIT CODE ===\n7"
    );
}

#[test]
fn blob_keys_are_scoped_by_owner() {
    let task_key = OutputSink::command_output_key("t-1");
    assert!(task_key.starts_with("tasks/t-1/output_"));
    assert!(task_key.ends_with(".txt"));

    let platform_key = OutputSink::authorized_keys_key("p-1");
    assert!(platform_key.starts_with("platforms/p-1/authorized_keys_"));
    assert!(platform_key.ends_with(".txt"));
}
