//! Catalog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the catalog sync workspace.
//!
//! # Overview
//!
//! - **Types**: the canonical [`CatalogRecord`] persisted by the sync pipeline
//! - **Snapshots**: JSON export/import of catalog records and data-quality audits
//! - **Checksums**: short content digests used for slugs and upload logging
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use catalog_common::snapshot::{read_snapshot, CatalogAudit};
//!
//! fn audit(path: &str) -> catalog_common::Result<()> {
//!     let records = read_snapshot(path)?;
//!     let audit = CatalogAudit::from_records(&records);
//!     tracing::info!(total = audit.total, "Snapshot audited");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod types;

// Re-export commonly used types
pub use error::{CatalogError, Result};
pub use types::CatalogRecord;
