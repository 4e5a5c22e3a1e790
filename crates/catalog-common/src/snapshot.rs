//! JSON snapshots of the catalog
//!
//! A snapshot is a pretty-printed JSON array of [`CatalogRecord`]s. Sync runs
//! can dump what they wrote, snapshots can be loaded back into the store, and
//! [`CatalogAudit`] summarizes their data quality.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CatalogError, Result};
use crate::types::CatalogRecord;

/// Write records as a pretty JSON array, creating parent directories
pub fn write_snapshot(path: impl AsRef<Path>, records: &[CatalogRecord]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;

    info!(path = %path.display(), records = records.len(), "Snapshot written");
    Ok(())
}

/// Read a snapshot written by [`write_snapshot`]
///
/// Every record must carry a non-blank `url_slug`, the store's key.
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Vec<CatalogRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let records: Vec<CatalogRecord> = serde_json::from_str(&content)?;

    if let Some(index) = records.iter().position(|r| r.url_slug.trim().is_empty()) {
        return Err(CatalogError::InvalidRecord(format!(
            "record {} in {} has no url_slug",
            index,
            path.display()
        )));
    }

    debug!(path = %path.display(), records = records.len(), "Snapshot loaded");
    Ok(records)
}

/// Data-quality summary of a set of catalog records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogAudit {
    pub total: usize,
    pub missing_brand: usize,
    pub missing_name: usize,
    pub missing_product_numbers: usize,
    pub missing_thumbnail: usize,
    /// Slugs that occur more than once, sorted
    pub duplicate_slugs: Vec<String>,
}

impl CatalogAudit {
    pub fn from_records(records: &[CatalogRecord]) -> Self {
        let mut audit = CatalogAudit {
            total: records.len(),
            ..Default::default()
        };

        let mut slug_counts: HashMap<&str, usize> = HashMap::new();

        for record in records {
            if !record.has_brand() {
                audit.missing_brand += 1;
            }
            if !record.has_name() {
                audit.missing_name += 1;
            }
            if !record.has_product_numbers() {
                audit.missing_product_numbers += 1;
            }
            if !record.has_thumbnail() {
                audit.missing_thumbnail += 1;
            }
            *slug_counts.entry(record.url_slug.as_str()).or_default() += 1;
        }

        audit.duplicate_slugs = slug_counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(slug, _)| slug.to_string())
            .collect();
        audit.duplicate_slugs.sort();

        audit
    }

    /// True when no record is missing a name or thumbnail and slugs are unique
    pub fn is_clean(&self) -> bool {
        self.missing_name == 0 && self.missing_thumbnail == 0 && self.duplicate_slugs.is_empty()
    }
}
