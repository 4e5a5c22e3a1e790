//! Raw upstream record shapes
//!
//! Each upstream produces its own record shape. [`RawUpstreamRecord`] keeps
//! them apart, and [`RawUpstreamRecord::view`] adapts either one into the
//! single [`RawRecordView`] the transformer works on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record as produced by an upstream page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RawUpstreamRecord {
    SearchHit(SearchHit),
    CatalogCard(CatalogCard),
}

/// A hit from the search API.
///
/// Decoded leniently from JSON: ids may be numbers or strings, and any field
/// may be missing or of the wrong type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Option<String>,
    pub brand: Option<String>,
    pub title: Option<String>,
    pub part_numbers: Vec<String>,
    pub thumbnail: Option<String>,
    pub url_slug: Option<String>,
}

impl SearchHit {
    pub fn from_json(hit: &Value) -> Self {
        Self {
            id: hit.get("id").and_then(scalar_to_string),
            brand: hit.get("brand").and_then(scalar_to_string),
            title: hit.get("title").and_then(scalar_to_string),
            part_numbers: hit
                .get("part_numbers")
                .and_then(Value::as_array)
                .map(|numbers| numbers.iter().filter_map(scalar_to_string).collect())
                .unwrap_or_default(),
            thumbnail: hit.get("thumbnail").and_then(scalar_to_string),
            url_slug: hit.get("url_slug").and_then(scalar_to_string),
        }
    }
}

/// A product card scraped from an HTML listing page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogCard {
    pub base_name: String,
    pub description: String,
    /// Absolute image URL
    pub image_url: String,
}

/// Source-independent view of a raw record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecordView {
    pub id: Option<String>,
    pub brand: Option<String>,
    /// Base product name, possibly prefixed with the brand
    pub title: Option<String>,
    /// Free-text qualifier appended to the title
    pub qualifier: Option<String>,
    pub product_numbers: Vec<String>,
    pub image_url: Option<String>,
    pub slug: Option<String>,
}

impl RawUpstreamRecord {
    pub fn view(&self) -> RawRecordView {
        match self {
            RawUpstreamRecord::SearchHit(hit) => RawRecordView {
                id: hit.id.clone(),
                brand: hit.brand.clone(),
                title: hit.title.clone(),
                qualifier: None,
                product_numbers: hit.part_numbers.clone(),
                image_url: hit.thumbnail.clone(),
                slug: hit.url_slug.clone(),
            },
            RawUpstreamRecord::CatalogCard(card) => RawRecordView {
                id: None,
                brand: None,
                title: Some(card.base_name.clone()),
                qualifier: Some(card.description.clone()),
                product_numbers: Vec::new(),
                image_url: Some(card.image_url.clone()),
                slug: None,
            },
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
