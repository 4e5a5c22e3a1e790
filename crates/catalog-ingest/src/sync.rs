//! Batched, idempotent catalog writes
//!
//! Records are written in contiguous batches, strictly in order, one batch at
//! a time. A failed batch is logged, counted and skipped.

use std::collections::HashMap;
use std::time::Duration;

use catalog_common::CatalogRecord;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::CatalogStore;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(200);

/// Counters for one or more batch writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncTally {
    pub inserted: u64,
    pub failed: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    /// Records dropped because a later record in the same batch had their slug
    pub deduplicated: u64,
}

impl SyncTally {
    pub fn absorb(&mut self, other: SyncTally) {
        self.inserted += other.inserted;
        self.failed += other.failed;
        self.batches_written += other.batches_written;
        self.batches_failed += other.batches_failed;
        self.deduplicated += other.deduplicated;
    }
}

pub struct BatchSynchronizer<S> {
    store: S,
    batch_size: usize,
    batch_pause: Duration,
    writes: u64,
}

impl<S: CatalogStore> BatchSynchronizer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            writes: 0,
        }
    }

    /// Zero is treated as one
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_batch_pause(mut self, batch_pause: Duration) -> Self {
        self.batch_pause = batch_pause;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Write `records` in batches of `batch_size`, checking `cancel` before
    /// every batch.
    pub async fn sync(&mut self, records: Vec<CatalogRecord>, cancel: &CancellationToken) -> SyncTally {
        let mut tally = SyncTally::default();
        let mut remaining = records.into_iter().peekable();

        while remaining.peek().is_some() {
            if cancel.is_cancelled() {
                info!(written = tally.batches_written, "Sync cancelled between batches");
                break;
            }

            let batch: Vec<CatalogRecord> = remaining.by_ref().take(self.batch_size).collect();
            tally.absorb(self.write_batch(batch).await);
        }

        tally
    }

    /// One insert-or-update call for `records`.
    ///
    /// Slugs repeated inside the batch are collapsed first so the statement
    /// never touches one row twice. Consecutive writes are separated by
    /// `batch_pause`.
    pub async fn write_batch(&mut self, records: Vec<CatalogRecord>) -> SyncTally {
        if records.is_empty() {
            return SyncTally::default();
        }

        if self.writes > 0 && !self.batch_pause.is_zero() {
            tokio::time::sleep(self.batch_pause).await;
        }
        self.writes += 1;
        let batch_number = self.writes;

        let (rows, deduplicated) = collapse_duplicate_slugs(records);
        if deduplicated > 0 {
            debug!(batch = batch_number, deduplicated, "Collapsed repeated slugs in batch");
        }

        match self.store.upsert_batch(&rows).await {
            Ok(_) => {
                debug!(batch = batch_number, rows = rows.len(), "Batch written");
                SyncTally {
                    inserted: rows.len() as u64,
                    batches_written: 1,
                    deduplicated,
                    ..Default::default()
                }
            },
            Err(e) => {
                warn!(batch = batch_number, rows = rows.len(), error = %e, "Batch write failed, skipping");
                SyncTally {
                    failed: rows.len() as u64,
                    batches_failed: 1,
                    deduplicated,
                    ..Default::default()
                }
            },
        }
    }
}

/// Keep one record per slug: the last one, at the first one's position.
///
/// Returns the collapsed records and how many were dropped.
pub fn collapse_duplicate_slugs(records: Vec<CatalogRecord>) -> (Vec<CatalogRecord>, u64) {
    let total = records.len();
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(total);
    let mut rows: Vec<CatalogRecord> = Vec::with_capacity(total);

    for record in records {
        match positions.get(&record.url_slug) {
            Some(&position) => rows[position] = record,
            None => {
                positions.insert(record.url_slug.clone(), rows.len());
                rows.push(record);
            },
        }
    }

    let dropped = (total - rows.len()) as u64;
    (rows, dropped)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::{IngestError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn record(slug: &str, name: &str) -> CatalogRecord {
        CatalogRecord {
            id: slug.to_string(),
            brand: "Acme Co".to_string(),
            product_name: name.to_string(),
            product_numbers: Vec::new(),
            thumbnail_url: String::new(),
            url_slug: slug.to_string(),
        }
    }

    /// Records every batch; fails the batches whose 1-based number is listed
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<String>>>,
        fail_batches: Vec<usize>,
    }

    #[async_trait]
    impl CatalogStore for RecordingStore {
        async fn upsert_batch(&self, rows: &[CatalogRecord]) -> Result<u64> {
            let mut batches = self.batches.lock().unwrap();
            batches.push(rows.iter().map(|r| r.url_slug.clone()).collect());
            if self.fail_batches.contains(&batches.len()) {
                return Err(IngestError::StoreUnavailable("connection reset".to_string()));
            }
            Ok(rows.len() as u64)
        }
    }

    #[test]
    fn test_collapse_keeps_last_value_at_first_position() {
        let (rows, dropped) = collapse_duplicate_slugs(vec![
            record("a", "first"),
            record("b", "b"),
            record("a", "second"),
        ]);

        assert_eq!(dropped, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url_slug, "a");
        assert_eq!(rows[0].product_name, "second");
        assert_eq!(rows[1].url_slug, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_partitions_in_order() {
        let mut sync = BatchSynchronizer::new(std::sync::Arc::new(RecordingStore::default())).with_batch_size(2);
        let store = std::sync::Arc::clone(&sync.store);

        let records = ["a", "b", "c", "d", "e"].iter().map(|s| record(s, s)).collect();
        let tally = sync.sync(records, &CancellationToken::new()).await;

        assert_eq!(tally.inserted, 5);
        assert_eq!(tally.batches_written, 3);
        assert_eq!(
            *store.batches.lock().unwrap(),
            vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_skipped() {
        let store = std::sync::Arc::new(RecordingStore {
            fail_batches: vec![2],
            ..Default::default()
        });
        let mut sync = BatchSynchronizer::new(std::sync::Arc::clone(&store)).with_batch_size(2);

        let records = ["a", "b", "c", "d", "e"].iter().map(|s| record(s, s)).collect();
        let tally = sync.sync(records, &CancellationToken::new()).await;

        assert_eq!(tally.inserted, 3);
        assert_eq!(tally.failed, 2);
        assert_eq!(tally.batches_written, 2);
        assert_eq!(tally.batches_failed, 1);
        assert_eq!(store.batches.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_batches() {
        let mut sync = BatchSynchronizer::new(RecordingStore::default()).with_batch_size(1);
        let start = tokio::time::Instant::now();

        let records = ["a", "b", "c"].iter().map(|s| record(s, s)).collect();
        sync.sync(records, &CancellationToken::new()).await;

        assert!(start.elapsed() >= DEFAULT_BATCH_PAUSE * 2);
        assert!(start.elapsed() < DEFAULT_BATCH_PAUSE * 3);
    }

    #[tokio::test]
    async fn test_cancelled_sync_writes_nothing() {
        let mut sync = BatchSynchronizer::new(RecordingStore::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tally = sync.sync(vec![record("a", "a")], &cancel).await;
        assert_eq!(tally, SyncTally::default());
        assert!(sync.store.batches.lock().unwrap().is_empty());
    }
}
