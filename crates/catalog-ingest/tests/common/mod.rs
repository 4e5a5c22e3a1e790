//! In-memory fakes for catalog-ingest integration tests
//!
//! - [`MemoryBlobStore`]: bucket/path keyed object map
//! - [`MemoryCatalogStore`]: slug keyed row map with scripted batch failures
//! - [`FakePageSource`]: scripted pages, records every requested page number
//!
//! Both the page source and the catalog store can cancel a token at a chosen
//! point to simulate an interrupt mid-run.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use catalog_common::CatalogRecord;
use catalog_ingest::error::{IngestError, Result};
use catalog_ingest::fetch::{Page, PageSource};
use catalog_ingest::governor::{GovernorConfig, RateGovernor};
use catalog_ingest::models::{RawUpstreamRecord, SearchHit};
use catalog_ingest::storage::{Asset, BlobStore};
use catalog_ingest::store::CatalogStore;
use tokio_util::sync::CancellationToken;

pub const PUBLIC_BASE: &str = "https://storage.test/public";

pub fn unthrottled() -> Arc<RateGovernor> {
    Arc::new(RateGovernor::new(GovernorConfig::unthrottled()))
}

// ============================================================================
// Blob store
// ============================================================================

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<(String, String), Asset>>,
    /// Paths whose upload fails
    pub fail_uploads: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn put(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), path.to_string()),
            Asset {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Asset> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Asset> {
        self.get(bucket, path)
            .ok_or_else(|| IngestError::AssetUnavailable(format!("{}/{} not found", bucket, path)))
    }

    async fn upload(&self, bucket: &str, path: &str, asset: Asset) -> Result<()> {
        if self.fail_uploads.lock().unwrap().iter().any(|p| p == path) {
            return Err(IngestError::AssetUnavailable(format!("upload of {} rejected", path)));
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), path.to_string()), asset);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", PUBLIC_BASE, bucket, path)
    }
}

// ============================================================================
// Catalog store
// ============================================================================

#[derive(Default)]
pub struct MemoryCatalogStore {
    rows: Mutex<HashMap<String, CatalogRecord>>,
    calls: Mutex<Vec<Vec<String>>>,
    /// 1-based batch numbers that fail
    fail_batches: Mutex<Vec<usize>>,
    /// Cancel the token once this 1-based batch has been written
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl MemoryCatalogStore {
    pub fn failing_batches(batches: &[usize]) -> Self {
        let store = Self::default();
        *store.fail_batches.lock().unwrap() = batches.to_vec();
        store
    }

    pub fn cancelling_after(batch: usize, cancel: CancellationToken) -> Self {
        let store = Self::default();
        *store.cancel_after.lock().unwrap() = Some((batch, cancel));
        store
    }

    pub fn row(&self, slug: &str) -> Option<CatalogRecord> {
        self.rows.lock().unwrap().get(slug).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Slugs of every batch in call order, failed ones included
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert_batch(&self, rows: &[CatalogRecord]) -> Result<u64> {
        let batch_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(rows.iter().map(|r| r.url_slug.clone()).collect());
            calls.len()
        };

        if self.fail_batches.lock().unwrap().contains(&batch_number) {
            return Err(IngestError::StoreUnavailable(format!("batch {} rejected", batch_number)));
        }

        {
            let mut table = self.rows.lock().unwrap();
            for row in rows {
                table.insert(row.url_slug.clone(), row.clone());
            }
        }

        if let Some((batch, cancel)) = self.cancel_after.lock().unwrap().as_ref() {
            if *batch == batch_number {
                cancel.cancel();
            }
        }
        Ok(rows.len() as u64)
    }
}

// ============================================================================
// Page source
// ============================================================================

pub struct FakePageSource {
    pages: Mutex<VecDeque<Result<Page>>>,
    requested: Arc<Mutex<Vec<u32>>>,
    /// Cancel the token when this page is requested
    cancel_on: Option<(u32, CancellationToken)>,
}

impl FakePageSource {
    pub fn new(pages: Vec<Result<Page>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requested: Arc::new(Mutex::new(Vec::new())),
            cancel_on: None,
        }
    }

    pub fn cancelling_on(mut self, page: u32, cancel: CancellationToken) -> Self {
        self.cancel_on = Some((page, cancel));
        self
    }

    /// Handle for asserting on requested pages after the source is moved
    pub fn requested(&self) -> Arc<Mutex<Vec<u32>>> {
        Arc::clone(&self.requested)
    }
}

#[async_trait]
impl PageSource for FakePageSource {
    fn host_key(&self) -> &str {
        "fake"
    }

    async fn fetch_page(&self, page: u32) -> Result<Page> {
        self.requested.lock().unwrap().push(page);
        if let Some((at, cancel)) = &self.cancel_on {
            if *at == page {
                cancel.cancel();
            }
        }
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}

// ============================================================================
// Record builders
// ============================================================================

pub fn hit(id: &str, title: &str, thumbnail: &str) -> RawUpstreamRecord {
    RawUpstreamRecord::SearchHit(SearchHit {
        id: Some(id.to_string()),
        title: Some(title.to_string()),
        thumbnail: Some(thumbnail.to_string()).filter(|t| !t.is_empty()),
        url_slug: Some(format!("acme-{}", id)),
        ..Default::default()
    })
}

pub fn page(records: Vec<RawUpstreamRecord>) -> Result<Page> {
    Ok(Page {
        records,
        total_hits: None,
    })
}

pub fn record(slug: &str, name: &str) -> CatalogRecord {
    CatalogRecord {
        id: slug.to_string(),
        brand: "Acme Co".to_string(),
        product_name: name.to_string(),
        product_numbers: vec![format!("{}-001", slug)],
        thumbnail_url: String::new(),
        url_slug: slug.to_string(),
    }
}
