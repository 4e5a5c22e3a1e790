//! JSON search API source
//!
//! `GET <endpoint>?facets=<json>&menu=<menu>&page=<n>&q=<q>&sort=<sort>`
//! answering `{"hits": [...], "estimatedTotalHits": n}`.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::instrument;

use super::{Page, PageSource};
use crate::error::{IngestError, Result};
use crate::governor::SEARCH_API_HOST;
use crate::models::{RawUpstreamRecord, SearchHit};

pub const DEFAULT_SEARCH_MENU: &str = "products";
pub const DEFAULT_SEARCH_SORT: &str = "views:desc";

/// Query for one search API run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchApiConfig {
    pub endpoint: String,
    /// Facet filter object, sent JSON-encoded
    pub facets: Value,
    pub menu: String,
    pub query: String,
    pub sort: String,
    /// Sent as `hitsPerPage` when set; otherwise the upstream default applies
    pub hits_per_page: Option<u32>,
    pub referer: Option<String>,
}

impl SearchApiConfig {
    pub fn new(endpoint: impl Into<String>, facets: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            facets,
            menu: DEFAULT_SEARCH_MENU.to_string(),
            query: String::new(),
            sort: DEFAULT_SEARCH_SORT.to_string(),
            hits_per_page: None,
            referer: None,
        }
    }

    /// All products of one brand
    pub fn for_brand(endpoint: impl Into<String>, brand: &str) -> Self {
        Self::new(endpoint, json!({ "brand": brand }))
    }

    /// All products of one category
    pub fn for_category(endpoint: impl Into<String>, category: &str) -> Self {
        Self::new(endpoint, json!({ "categories": category }))
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub fn with_hits_per_page(mut self, hits_per_page: u32) -> Self {
        self.hits_per_page = Some(hits_per_page);
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

pub struct SearchApiSource {
    client: Client,
    config: SearchApiConfig,
}

impl SearchApiSource {
    pub fn new(client: Client, config: SearchApiConfig) -> Self {
        Self { client, config }
    }

    fn query_params(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("facets", self.config.facets.to_string()),
            ("menu", self.config.menu.clone()),
            ("page", page.to_string()),
            ("q", self.config.query.clone()),
            ("sort", self.config.sort.clone()),
        ];
        if let Some(hits_per_page) = self.config.hits_per_page {
            params.push(("hitsPerPage", hits_per_page.to_string()));
        }
        params
    }
}

#[async_trait]
impl PageSource for SearchApiSource {
    fn host_key(&self) -> &str {
        SEARCH_API_HOST
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn fetch_page(&self, page: u32) -> Result<Page> {
        let mut request = self
            .client
            .get(&self.config.endpoint)
            .query(&self.query_params(page))
            .header(ACCEPT, "application/json, text/plain, */*");

        if let Some(referer) = &self.config.referer {
            request = request.header(REFERER, referer);
        }

        let response = request.send().await.map_err(IngestError::from_upstream)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::from_status(status, &self.config.endpoint));
        }

        let body: Value = response.json().await.map_err(IngestError::from_upstream)?;
        Ok(parse_search_response(&body))
    }
}

/// Decode a search response body. Missing `hits` reads as an empty page.
pub fn parse_search_response(body: &Value) -> Page {
    let records = body
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| RawUpstreamRecord::SearchHit(SearchHit::from_json(hit)))
                .collect()
        })
        .unwrap_or_default();

    Page {
        records,
        total_hits: body.get("estimatedTotalHits").and_then(Value::as_u64),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let page = parse_search_response(&json!({
            "hits": [
                {"id": 1, "title": "Duksan Acetone"},
                {"id": "2", "title": "Duksan Ethanol", "url_slug": "duksan-ethanol"}
            ],
            "estimatedTotalHits": 27
        }));

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total_hits, Some(27));
    }

    #[test]
    fn test_missing_hits_is_empty_page() {
        let page = parse_search_response(&json!({"message": "rate limited"}));
        assert!(page.records.is_empty());
        assert_eq!(page.total_hits, None);
    }

    #[test]
    fn test_query_params() {
        let source = SearchApiSource::new(
            Client::new(),
            SearchApiConfig::for_brand("https://api.example.com/search", "Duksan").with_hits_per_page(24),
        );

        let params = source.query_params(3);
        assert!(params.contains(&("facets", r#"{"brand":"Duksan"}"#.to_string())));
        assert!(params.contains(&("page", "3".to_string())));
        assert!(params.contains(&("sort", "views:desc".to_string())));
        assert!(params.contains(&("hitsPerPage", "24".to_string())));
    }
}
