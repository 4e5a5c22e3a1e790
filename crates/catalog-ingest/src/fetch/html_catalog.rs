//! HTML catalog listing source
//!
//! Scrapes product cards from a paginated listing page. The site declares no
//! total, so pagination ends on an empty page or at the page cap.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use super::{Page, PageSource};
use crate::error::{IngestError, Result};
use crate::governor::HTML_CATALOG_HOST;
use crate::models::{CatalogCard, RawUpstreamRecord};

pub const DEFAULT_PAGE_PARAM: &str = "ps_page";
pub const DEFAULT_CARD_SELECTOR: &str = r#"a[href^="m_mall_detail.php"]"#;
pub const DEFAULT_NAME_SELECTOR: &str = ".subject";
pub const DEFAULT_QUALIFIER_SELECTOR: &str = ".category";
pub const DEFAULT_IMAGE_SELECTOR: &str = ".thumb img";

/// Listing pages beyond this are never requested for HTML catalogs
pub const DEFAULT_HTML_MAX_PAGES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlCatalogConfig {
    pub list_url: String,
    /// Query parameter carrying the page number
    pub page_param: String,
    /// Fixed query parameters, e.g. the category id
    pub params: Vec<(String, String)>,
    /// Base that relative image sources are resolved against
    pub asset_base_url: String,
    pub card_selector: String,
    pub name_selector: String,
    pub qualifier_selector: String,
    pub image_selector: String,
}

impl HtmlCatalogConfig {
    pub fn new(list_url: impl Into<String>, asset_base_url: impl Into<String>) -> Self {
        Self {
            list_url: list_url.into(),
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            params: Vec::new(),
            asset_base_url: asset_base_url.into(),
            card_selector: DEFAULT_CARD_SELECTOR.to_string(),
            name_selector: DEFAULT_NAME_SELECTOR.to_string(),
            qualifier_selector: DEFAULT_QUALIFIER_SELECTOR.to_string(),
            image_selector: DEFAULT_IMAGE_SELECTOR.to_string(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

struct CardSelectors {
    card: Selector,
    name: Selector,
    qualifier: Selector,
    image: Selector,
}

impl CardSelectors {
    fn parse(config: &HtmlCatalogConfig) -> Result<Self> {
        Ok(Self {
            card: parse_selector(&config.card_selector)?,
            name: parse_selector(&config.name_selector)?,
            qualifier: parse_selector(&config.qualifier_selector)?,
            image: parse_selector(&config.image_selector)?,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| IngestError::Config(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

pub struct HtmlCatalogSource {
    client: Client,
    config: HtmlCatalogConfig,
    selectors: CardSelectors,
}

impl HtmlCatalogSource {
    /// Fails on an unparsable selector
    pub fn new(client: Client, config: HtmlCatalogConfig) -> Result<Self> {
        let selectors = CardSelectors::parse(&config)?;
        Ok(Self {
            client,
            config,
            selectors,
        })
    }

    /// Extract the valid product cards from one listing page.
    ///
    /// A card without a name or without an image source is skipped.
    pub fn parse_cards(&self, html: &str) -> Vec<CatalogCard> {
        let document = Html::parse_document(html);

        document
            .select(&self.selectors.card)
            .filter_map(|card| {
                let base_name = first_text(card, &self.selectors.name);
                let image_src = card
                    .select(&self.selectors.image)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .map(str::trim)
                    .unwrap_or_default();

                if base_name.is_empty() || image_src.is_empty() {
                    return None;
                }

                Some(CatalogCard {
                    base_name,
                    description: first_text(card, &self.selectors.qualifier),
                    image_url: resolve_image_url(&self.config.asset_base_url, image_src),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PageSource for HtmlCatalogSource {
    fn host_key(&self) -> &str {
        HTML_CATALOG_HOST
    }

    #[instrument(skip(self), fields(list_url = %self.config.list_url))]
    async fn fetch_page(&self, page: u32) -> Result<Page> {
        let mut params = self.config.params.clone();
        params.push((self.config.page_param.clone(), page.to_string()));

        let response = self
            .client
            .get(&self.config.list_url)
            .query(&params)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(IngestError::from_upstream)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::from_status(status, &self.config.list_url));
        }

        let html = response.text().await.map_err(IngestError::from_upstream)?;
        let cards = self.parse_cards(&html);
        debug!(page, cards = cards.len(), "Parsed listing page");

        Ok(Page {
            records: cards.into_iter().map(RawUpstreamRecord::CatalogCard).collect(),
            total_hits: None,
        })
    }
}

/// Whitespace-normalized text of the first match, or empty
fn first_text(card: ElementRef<'_>, selector: &Selector) -> String {
    card.select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Absolute URL for an image source: `./x` and `x` become `<base>/x`
pub fn resolve_image_url(base: &str, src: &str) -> String {
    if src.starts_with("http://") || src.starts_with("https://") {
        return src.to_string();
    }
    if let Some(rest) = src.strip_prefix("//") {
        return format!("https://{}", rest);
    }

    let path = src.strip_prefix("./").unwrap_or(src).trim_start_matches('/');
    format!("{}/{}", base.trim_end_matches('/'), path)
}
