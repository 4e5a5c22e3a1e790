//! Raw record → canonical [`CatalogRecord`]
//!
//! Pure and total: no I/O, no errors. Missing or malformed input degrades to
//! caller defaults, empty strings and empty lists.

use catalog_common::checksum::short_digest;
use catalog_common::CatalogRecord;
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::models::{RawRecordView, RawUpstreamRecord};

/// Hex digits of the identity digest appended to generated slugs
const SLUG_DIGEST_LEN: usize = 8;

/// Caller-supplied values for fields the upstream may omit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformDefaults {
    pub brand_name: String,
    /// URL-safe brand prefix for generated slugs and storage paths
    pub brand_slug: String,
}

impl TransformDefaults {
    /// Build defaults, deriving the brand slug from the name when not given.
    ///
    /// Fails when no usable slug results (e.g. a non-Latin brand name without
    /// an explicit slug).
    pub fn new(brand_name: impl Into<String>, brand_slug: Option<&str>) -> Result<Self> {
        let brand_name = brand_name.into().trim().to_string();
        let brand_slug = slugify(brand_slug.unwrap_or(&brand_name));

        if brand_name.is_empty() {
            return Err(IngestError::Config("brand name must not be empty".to_string()));
        }
        if brand_slug.is_empty() {
            return Err(IngestError::Config(format!(
                "cannot derive a brand slug from '{}'; pass one explicitly",
                brand_name
            )));
        }

        Ok(Self {
            brand_name,
            brand_slug,
        })
    }
}

/// Transform one raw upstream record
pub fn transform(raw: &RawUpstreamRecord, defaults: &TransformDefaults) -> CatalogRecord {
    transform_view(&raw.view(), defaults)
}

/// Transform an already adapted view
pub fn transform_view(view: &RawRecordView, defaults: &TransformDefaults) -> CatalogRecord {
    let brand = non_blank(&view.brand).unwrap_or(&defaults.brand_name).to_string();

    let title = non_blank(&view.title).unwrap_or_default();
    let base_name = strip_brand_prefix(title, &[&brand, &defaults.brand_name]);
    let product_name = join_name(base_name, non_blank(&view.qualifier).unwrap_or_default());

    let id = match non_blank(&view.id) {
        Some(id) => id.to_string(),
        None => derive_id(view, defaults),
    };

    let url_slug = match non_blank(&view.slug) {
        Some(slug) => slug.to_string(),
        None => generate_slug(&defaults.brand_slug, &product_name, &id),
    };

    let product_numbers = view
        .product_numbers
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();

    CatalogRecord {
        id,
        brand,
        product_name,
        product_numbers,
        thumbnail_url: non_blank(&view.image_url).unwrap_or_default().to_string(),
        url_slug,
    }
}

/// A record with no id, no slug and no title carries no identity
pub fn is_malformed(view: &RawRecordView) -> bool {
    check_identity(view).is_err()
}

/// [`IngestError::MalformedRecord`] naming what the record lacks
pub fn check_identity(view: &RawRecordView) -> Result<()> {
    if non_blank(&view.id).is_none() && non_blank(&view.slug).is_none() && non_blank(&view.title).is_none() {
        let image = non_blank(&view.image_url).unwrap_or("none");
        return Err(IngestError::MalformedRecord(format!(
            "no id, slug or title (image: {})",
            image
        )));
    }
    Ok(())
}

/// Lower-case, replace everything outside `[a-z0-9-]` with `-`, collapse
/// repeated separators and trim them from both ends.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());

    for c in input.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }

    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

/// `<brand-slug>-<name-slug>-<digest of id>`; empty parts are skipped
pub fn generate_slug(brand_slug: &str, product_name: &str, id: &str) -> String {
    let digest = short_digest(id, SLUG_DIGEST_LEN);
    let name = slugify(product_name);

    [brand_slug, name.as_str(), digest.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-")
}

fn strip_brand_prefix<'a>(title: &'a str, brands: &[&str]) -> &'a str {
    for brand in brands.iter().map(|b| b.trim()).filter(|b| !b.is_empty()) {
        let Some(head) = title.get(..brand.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(brand) {
            continue;
        }

        let rest = &title[brand.len()..];
        if rest.starts_with(char::is_whitespace) && !rest.trim().is_empty() {
            return rest.trim_start();
        }
    }

    title
}

fn join_name(base: &str, qualifier: &str) -> String {
    format!("{} {}", base.trim(), qualifier.trim()).trim().to_string()
}

/// Stable id for records the upstream did not identify
fn derive_id(view: &RawRecordView, defaults: &TransformDefaults) -> String {
    let identity = format!(
        "{}|{}|{}|{}",
        defaults.brand_slug,
        view.title.as_deref().unwrap_or_default().trim(),
        view.qualifier.as_deref().unwrap_or_default().trim(),
        view.image_url.as_deref().unwrap_or_default().trim(),
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, identity.as_bytes()).to_string()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
