//! Catalog Ingest Library
//!
//! Scrapes product catalogs from upstream sites, copies product images into
//! owned storage and upserts canonical records into the catalog database.
//!
//! # Stages
//!
//! - [`fetch`]: paginated upstream readers (JSON search API, HTML listing)
//! - [`transform`]: raw record → [`catalog_common::CatalogRecord`]
//! - [`relocate`]: image copy into the blob store with URL fallback
//! - [`sync`]: batched insert-or-update keyed by `url_slug`
//! - [`governor`]: per-host spacing of outbound calls
//! - [`pipeline`]: the driver tying the stages together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use catalog_ingest::config::IngestConfig;
//! use catalog_ingest::fetch::{build_http_client, Paginator, SearchApiConfig, SearchApiSource};
//! use catalog_ingest::governor::RateGovernor;
//! use catalog_ingest::pipeline::Pipeline;
//! use catalog_ingest::relocate::AssetRelocator;
//! use catalog_ingest::storage::S3BlobStore;
//! use catalog_ingest::store::PgCatalogStore;
//! use catalog_ingest::sync::BatchSynchronizer;
//! use catalog_ingest::transform::TransformDefaults;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let governor = Arc::new(RateGovernor::new(config.governor.clone()));
//!     let client = build_http_client(config.http.timeout, &config.http.user_agent)?;
//!
//!     let source = SearchApiSource::new(
//!         client.clone(),
//!         SearchApiConfig::for_brand(&config.search_endpoint, "Acme Co"),
//!     );
//!     let paginator = Paginator::new(source, config.fetch, Arc::clone(&governor));
//!
//!     let blobs = Arc::new(S3BlobStore::new(&config.storage));
//!     let relocator = AssetRelocator::new(client, blobs, &config.storage.bucket, governor);
//!
//!     let store = PgCatalogStore::connect(
//!         &config.database.url,
//!         config.database.max_connections,
//!         config.database.timeout,
//!     )
//!     .await?;
//!
//!     let output = Pipeline::new(
//!         paginator,
//!         TransformDefaults::new("Acme Co", None)?,
//!         relocator,
//!         BatchSynchronizer::new(store),
//!     )
//!     .run(&CancellationToken::new())
//!     .await;
//!
//!     println!("{}", serde_json::to_string_pretty(&output.report)?);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod fetch;
pub mod governor;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod relocate;
pub mod report;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transform;

pub use error::{IngestError, Result};
