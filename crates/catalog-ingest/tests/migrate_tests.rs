//! Bucket migration over the in-memory blob store

mod common;

use catalog_ingest::governor::{GovernorConfig, RateGovernor};
use catalog_ingest::migrate::migrate_bucket;
use common::MemoryBlobStore;
use tokio_util::sync::CancellationToken;

fn seeded_store() -> MemoryBlobStore {
    let store = MemoryBlobStore::default();
    store.put("legacy", "acme-co/1.jpg", b"one", "image/jpeg");
    store.put("legacy", "acme-co/2.png", b"two", "image/png");
    store.put("legacy", "acme-co/", b"", "application/x-directory");
    store.put("legacy", "other/3.png", b"three", "image/png");
    store
}

#[tokio::test]
async fn test_copies_every_object_under_prefix() {
    let store = seeded_store();
    let governor = RateGovernor::new(GovernorConfig::unthrottled());

    let report = migrate_bucket(&store, &governor, "legacy", "images", "acme-co/", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.copied, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(store.keys("images"), vec!["acme-co/1.jpg", "acme-co/2.png"]);

    let copied = store.get("images", "acme-co/2.png").unwrap();
    assert_eq!(copied.bytes, b"two".to_vec());
    assert_eq!(copied.content_type, "image/png");
}

#[tokio::test]
async fn test_failed_object_is_counted_and_skipped() {
    let store = seeded_store();
    store.fail_uploads.lock().unwrap().push("acme-co/1.jpg".to_string());
    let governor = RateGovernor::new(GovernorConfig::unthrottled());

    let report = migrate_bucket(&store, &governor, "legacy", "images", "", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.copied, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures, vec!["acme-co/1.jpg".to_string()]);
    assert!(store.get("images", "other/3.png").is_some());
}

#[tokio::test]
async fn test_overwrites_existing_objects() {
    let store = seeded_store();
    store.put("images", "acme-co/1.jpg", b"stale", "image/jpeg");
    let governor = RateGovernor::new(GovernorConfig::unthrottled());

    migrate_bucket(&store, &governor, "legacy", "images", "acme-co/", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.get("images", "acme-co/1.jpg").unwrap().bytes, b"one".to_vec());
}

#[tokio::test]
async fn test_cancelled_migration_stops() {
    let store = seeded_store();
    let governor = RateGovernor::new(GovernorConfig::unthrottled());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = migrate_bucket(&store, &governor, "legacy", "images", "", &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.copied, 0);
    assert!(store.keys("images").is_empty());
}
