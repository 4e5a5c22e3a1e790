//! Canonical catalog types

use serde::{Deserialize, Serialize};

/// Canonical product record, persisted as one row of the `products` table.
///
/// The field names are the persisted/JSON schema:
/// `{ id, brand, product_name, product_numbers, thumbnail_url, url_slug }`.
///
/// `url_slug` is the natural key. Two records sharing a slug are the same
/// logical product and the later write replaces the whole row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Upstream-assigned identifier, or a deterministic one generated from
    /// the record identity when the upstream has none
    pub id: String,

    /// Display brand
    pub brand: String,

    /// Normalized display name
    pub product_name: String,

    /// Catalog / part numbers in upstream order
    #[serde(default)]
    pub product_numbers: Vec<String>,

    /// Owned copy of the product image, or the upstream URL when the copy failed
    #[serde(default)]
    pub thumbnail_url: String,

    /// Unique URL-safe key
    pub url_slug: String,
}

impl CatalogRecord {
    pub fn has_brand(&self) -> bool {
        !self.brand.trim().is_empty()
    }

    pub fn has_name(&self) -> bool {
        !self.product_name.trim().is_empty()
    }

    pub fn has_product_numbers(&self) -> bool {
        !self.product_numbers.is_empty()
    }

    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail_url.trim().is_empty()
    }
}
