//! Bucket-to-bucket copy of stored images

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::governor::{RateGovernor, ASSET_HOST};
use crate::storage::BlobStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub listed: u64,
    pub copied: u64,
    pub failed: u64,
    /// Object keys that could not be copied
    pub failures: Vec<String>,
    pub cancelled: bool,
}

/// Copy every object under `prefix` from bucket `from` to bucket `to`,
/// overwriting existing objects.
///
/// Only the listing can fail the call; a failed object is counted and
/// skipped.
#[instrument(skip(store, governor, cancel))]
pub async fn migrate_bucket(
    store: &dyn BlobStore,
    governor: &RateGovernor,
    from: &str,
    to: &str,
    prefix: &str,
    cancel: &CancellationToken,
) -> Result<MigrationReport> {
    let keys = store.list(from, prefix).await?;
    let mut report = MigrationReport {
        listed: keys.len() as u64,
        ..Default::default()
    };

    info!(objects = keys.len(), "Starting bucket migration");

    // Folder placeholders carry no data
    for key in keys.iter().filter(|key| !key.ends_with('/')) {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        governor.throttle(ASSET_HOST).await;

        let copied = match store.download(from, key).await {
            Ok(asset) => store.upload(to, key, asset).await,
            Err(e) => Err(e),
        };

        match copied {
            Ok(()) => report.copied += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "Object copy failed");
                report.failed += 1;
                report.failures.push(key.clone());
            },
        }
    }

    info!(
        copied = report.copied,
        failed = report.failed,
        cancelled = report.cancelled,
        "Bucket migration finished"
    );
    Ok(report)
}
