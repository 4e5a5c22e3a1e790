//! Pipeline driver
//!
//! Fetch → transform → relocate → sync, one page at a time:
//!
//! 1. pull the next page from the [`Paginator`]
//! 2. drop records without identity, transform the rest
//! 3. relocate their images with up to `relocation_workers` copies in flight,
//!    keeping fetch order
//! 4. write every full batch, then flush the remainder once pagination ends
//!
//! Cancellation is checked between pages and between batches. Per-record and
//! per-batch failures only show up in the returned [`PipelineRunReport`].

use std::path::Path;

use catalog_common::snapshot::read_snapshot;
use catalog_common::CatalogRecord;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::fetch::{PageSource, Paginator};
use crate::models::RawUpstreamRecord;
use crate::relocate::{AssetRelocator, RelocationOutcome};
use crate::report::PipelineRunReport;
use crate::store::CatalogStore;
use crate::sync::BatchSynchronizer;
use crate::transform::{check_identity, transform_view, TransformDefaults};

pub const DEFAULT_RELOCATION_WORKERS: usize = 4;

/// Result of one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: PipelineRunReport,
    /// Every record handed to the synchronizer, when collection is enabled
    pub records: Vec<CatalogRecord>,
}

pub struct Pipeline<S, C> {
    paginator: Paginator<S>,
    defaults: TransformDefaults,
    relocator: AssetRelocator,
    synchronizer: BatchSynchronizer<C>,
    relocation_workers: usize,
    collect_records: bool,
}

impl<S: PageSource, C: CatalogStore> Pipeline<S, C> {
    pub fn new(
        paginator: Paginator<S>,
        defaults: TransformDefaults,
        relocator: AssetRelocator,
        synchronizer: BatchSynchronizer<C>,
    ) -> Self {
        Self {
            paginator,
            defaults,
            relocator,
            synchronizer,
            relocation_workers: DEFAULT_RELOCATION_WORKERS,
            collect_records: false,
        }
    }

    /// One worker relocates strictly sequentially
    pub fn with_relocation_workers(mut self, workers: usize) -> Self {
        self.relocation_workers = workers.max(1);
        self
    }

    /// Keep a copy of every synchronized record, e.g. for a snapshot
    pub fn collect_records(mut self, collect: bool) -> Self {
        self.collect_records = collect;
        self
    }

    #[instrument(skip_all, fields(brand = %self.defaults.brand_name))]
    pub async fn run(mut self, cancel: &CancellationToken) -> PipelineOutput {
        let mut report = PipelineRunReport::start();
        let mut collected = Vec::new();
        let mut pending: Vec<CatalogRecord> = Vec::new();
        let batch_size = self.synchronizer.batch_size();

        info!(batch_size, workers = self.relocation_workers, "Pipeline run started");

        'pages: loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break 'pages;
                }
                page = self.paginator.next_page() => page,
            };

            let raw_records = match page {
                Some(Ok(records)) => records,
                Some(Err(e)) => {
                    report.fetch_error = Some(e.to_string());
                    break;
                },
                None => break,
            };

            report.pages_fetched += 1;
            report.fetched += raw_records.len() as u64;

            let records = self.transform_page(&raw_records, &mut report);
            for (record, outcome) in self.relocate_page(records).await {
                report.record_relocation(outcome);
                pending.push(record);
            }

            while pending.len() >= batch_size {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'pages;
                }
                let batch: Vec<CatalogRecord> = pending.drain(..batch_size).collect();
                self.write(batch, &mut report, &mut collected).await;
            }
        }

        if report.cancelled {
            if !pending.is_empty() {
                info!(unwritten = pending.len(), "Run cancelled, remaining records not written");
            }
        } else if !pending.is_empty() {
            self.write(pending, &mut report, &mut collected).await;
        }

        report.finish();
        log_summary(&report);

        PipelineOutput {
            report,
            records: collected,
        }
    }

    fn transform_page(&self, raw_records: &[RawUpstreamRecord], report: &mut PipelineRunReport) -> Vec<CatalogRecord> {
        let mut records = Vec::with_capacity(raw_records.len());

        for raw in raw_records {
            let view = raw.view();
            if let Err(e) = check_identity(&view) {
                debug!(error = %e, "Dropping record");
                report.malformed += 1;
                continue;
            }
            records.push(transform_view(&view, &self.defaults));
        }

        report.transformed += records.len() as u64;
        records
    }

    async fn relocate_page(&self, records: Vec<CatalogRecord>) -> Vec<(CatalogRecord, RelocationOutcome)> {
        let relocator = &self.relocator;
        let brand_slug = self.defaults.brand_slug.as_str();

        stream::iter(records)
            .map(|mut record| async move {
                let relocation = relocator
                    .relocate(&record.thumbnail_url, &record.id, brand_slug)
                    .await;
                record.thumbnail_url = relocation.url;
                (record, relocation.outcome)
            })
            .buffered(self.relocation_workers)
            .collect()
            .await
    }

    async fn write(
        &mut self,
        batch: Vec<CatalogRecord>,
        report: &mut PipelineRunReport,
        collected: &mut Vec<CatalogRecord>,
    ) {
        if self.collect_records {
            collected.extend(batch.iter().cloned());
        }
        let tally = self.synchronizer.write_batch(batch).await;
        report.absorb(tally);
    }
}

/// Upsert every record of a snapshot file written by a previous run
pub async fn load_snapshot<C: CatalogStore>(
    path: &Path,
    synchronizer: &mut BatchSynchronizer<C>,
    cancel: &CancellationToken,
) -> Result<PipelineRunReport> {
    let records = read_snapshot(path)?;
    info!(records = records.len(), path = %path.display(), "Loading snapshot");
    Ok(load_records(records, synchronizer, cancel).await)
}

/// Upsert already transformed records
pub async fn load_records<C: CatalogStore>(
    records: Vec<CatalogRecord>,
    synchronizer: &mut BatchSynchronizer<C>,
    cancel: &CancellationToken,
) -> PipelineRunReport {
    let mut report = PipelineRunReport::start();
    report.fetched = records.len() as u64;
    report.transformed = records.len() as u64;

    let tally = synchronizer.sync(records, cancel).await;
    report.absorb(tally);
    report.cancelled = cancel.is_cancelled();

    report.finish();
    log_summary(&report);
    report
}

fn log_summary(report: &PipelineRunReport) {
    if report.is_complete() {
        info!(
            fetched = report.fetched,
            inserted = report.inserted,
            relocated_ok = report.relocated_ok,
            relocated_fallback = report.relocated_fallback,
            elapsed_secs = report.elapsed_secs(),
            "Pipeline run complete"
        );
    } else {
        warn!(
            fetched = report.fetched,
            inserted = report.inserted,
            failed = report.failed,
            batches_failed = report.batches_failed,
            cancelled = report.cancelled,
            fetch_error = report.fetch_error.as_deref().unwrap_or("none"),
            elapsed_secs = report.elapsed_secs(),
            "Pipeline run finished with gaps"
        );
    }
}
