//! Image relocation into owned storage
//!
//! Downloads a product image from the upstream and re-uploads it under
//! `<brand_slug>/<record_id>.<ext>`. Any failure degrades to the upstream URL;
//! relocation never drops a record and never retries.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::{IngestError, Result};
use crate::governor::{RateGovernor, ASSET_HOST};
use crate::storage::{Asset, BlobStore};

pub const DEFAULT_EXTENSION: &str = "png";

/// How a relocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationOutcome {
    Relocated,
    /// The upstream URL was kept
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub url: String,
    pub outcome: RelocationOutcome,
}

impl Relocation {
    fn fallback(source_url: &str) -> Self {
        Self {
            url: source_url.to_string(),
            outcome: RelocationOutcome::Fallback,
        }
    }
}

pub struct AssetRelocator {
    client: Client,
    store: Arc<dyn BlobStore>,
    bucket: String,
    governor: Arc<RateGovernor>,
}

impl AssetRelocator {
    /// `client` must carry the request timeout
    pub fn new(
        client: Client,
        store: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        governor: Arc<RateGovernor>,
    ) -> Self {
        Self {
            client,
            store,
            bucket: bucket.into(),
            governor,
        }
    }

    /// Copy the image at `source_url` into owned storage.
    ///
    /// Returns the public URL of the copy, or `source_url` unchanged when the
    /// source is blank or any step fails.
    #[instrument(skip(self))]
    pub async fn relocate(&self, source_url: &str, record_id: &str, brand_slug: &str) -> Relocation {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            debug!(record_id, "No image to relocate");
            return Relocation::fallback(source_url);
        }

        let path = storage_path(brand_slug, record_id, source_url);
        match self.copy(source_url, &path).await {
            Ok(()) => Relocation {
                url: self.store.public_url(&self.bucket, &path),
                outcome: RelocationOutcome::Relocated,
            },
            Err(e) => {
                warn!(record_id, source_url, error = %e, "Image relocation failed, keeping upstream URL");
                Relocation::fallback(source_url)
            },
        }
    }

    async fn copy(&self, source_url: &str, path: &str) -> Result<()> {
        self.governor.throttle(ASSET_HOST).await;

        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| IngestError::AssetUnavailable(format!("GET {} failed: {}", source_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::AssetUnavailable(format!("HTTP {} from {}", status, source_url)));
        }

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::AssetUnavailable(format!("Reading {} failed: {}", source_url, e)))?;

        let content_type = match header_type {
            Some(ct) if ct.starts_with("image/") => ct,
            _ => content_type_for(&image_extension(source_url)).to_string(),
        };

        self.store
            .upload(
                &self.bucket,
                path,
                Asset {
                    bytes: bytes.to_vec(),
                    content_type,
                },
            )
            .await
    }
}

#[allow(clippy::expect_used)]
fn extension_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)").expect("static pattern is valid"))
}

/// First image extension found in `url`, lower-cased; `png` when none
pub fn image_extension(url: &str) -> String {
    extension_pattern()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// `<brand_slug>/<record_id>.<ext>`; path separators in the id are replaced
pub fn storage_path(brand_slug: &str, record_id: &str, source_url: &str) -> String {
    let id = record_id.trim().replace(['/', '\\'], "-");
    format!("{}/{}.{}", brand_slug, id, image_extension(source_url))
}
