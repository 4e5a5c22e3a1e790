//! Paginated upstream fetching
//!
//! A [`PageSource`] knows how to request one page from one upstream. The
//! [`Paginator`] walks a source from page 1, applies the retry policy and the
//! termination rules, and consults the [`RateGovernor`] before every request.
//!
//! Termination, first rule wins:
//! 1. a page with zero records
//! 2. the running record count reaches the total declared by the upstream
//! 3. the `max_pages` cap
//!
//! A failure that survives the retry policy ends pagination. It is surfaced
//! once, after every record already produced.

pub mod html_catalog;
pub mod search_api;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::governor::RateGovernor;
use crate::models::RawUpstreamRecord;

pub use html_catalog::{HtmlCatalogConfig, HtmlCatalogSource};
pub use search_api::{SearchApiConfig, SearchApiSource};

/// Safety cap on pages walked for one source
pub const DEFAULT_MAX_PAGES: u32 = 200;

/// Attempts per page, first try included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles on every further attempt
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Default request timeout for upstream HTTP calls
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser-like user agent; some catalog sites reject library defaults
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One decoded upstream page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<RawUpstreamRecord>,
    /// Total record count declared by the upstream, when it declares one
    pub total_hits: Option<u64>,
}

/// One upstream that can be read page by page
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Key under which calls to this upstream are rate limited
    fn host_key(&self) -> &str;

    /// Fetch and decode page `page` (1-based). Called once per attempt.
    async fn fetch_page(&self, page: u32) -> Result<Page>;
}

/// Retry and cap settings for one pagination run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub max_pages: u32,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }
}

impl FetchPolicy {
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Backoff slept after failed attempt `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor)
    }
}

/// Build the HTTP client shared by the page sources and the asset relocator
pub fn build_http_client(timeout: Duration, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Walks one [`PageSource`] from page 1.
///
/// Not restartable: once it has stopped it stays stopped, and a new run needs
/// a new paginator.
pub struct Paginator<S> {
    source: S,
    policy: FetchPolicy,
    governor: Arc<RateGovernor>,
    next_page: u32,
    records_fetched: u64,
    pages_fetched: u32,
    done: bool,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, policy: FetchPolicy, governor: Arc<RateGovernor>) -> Self {
        Self {
            source,
            policy,
            governor,
            next_page: 1,
            records_fetched: 0,
            pages_fetched: 0,
            done: false,
        }
    }

    /// Pages that returned at least one record
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn records_fetched(&self) -> u64 {
        self.records_fetched
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next page.
    ///
    /// Returns `None` once pagination has ended, `Some(Err(_))` exactly once
    /// when it ends on a failure.
    pub async fn next_page(&mut self) -> Option<Result<Vec<RawUpstreamRecord>>> {
        if self.done {
            return None;
        }

        if self.next_page > self.policy.max_pages {
            info!(
                host = self.source.host_key(),
                max_pages = self.policy.max_pages,
                "Reached page cap, stopping pagination"
            );
            self.done = true;
            return None;
        }

        let page_number = self.next_page;
        let page = match self.fetch_with_retry(page_number).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    host = self.source.host_key(),
                    page = page_number,
                    error = %e,
                    "Pagination stopped on upstream failure"
                );
                self.done = true;
                return Some(Err(e));
            },
        };

        if page.records.is_empty() {
            debug!(host = self.source.host_key(), page = page_number, "Empty page, pagination complete");
            self.done = true;
            return None;
        }

        self.next_page += 1;
        self.pages_fetched += 1;
        self.records_fetched += page.records.len() as u64;

        if let Some(total) = page.total_hits {
            if self.records_fetched >= total {
                debug!(
                    host = self.source.host_key(),
                    fetched = self.records_fetched,
                    total,
                    "Declared total reached, pagination complete"
                );
                self.done = true;
            }
        }

        debug!(
            host = self.source.host_key(),
            page = page_number,
            records = page.records.len(),
            "Fetched page"
        );

        Some(Ok(page.records))
    }

    /// Drain the paginator as a record stream.
    ///
    /// A terminal failure shows up as the last item of the stream.
    pub fn fetch_all(self) -> impl Stream<Item = Result<RawUpstreamRecord>> {
        stream::unfold(self, |mut paginator| async move {
            paginator.next_page().await.map(|page| (page, paginator))
        })
        .flat_map(|page| {
            let items: Vec<Result<RawUpstreamRecord>> = match page {
                Ok(records) => records.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
    }

    async fn fetch_with_retry(&self, page: u32) -> Result<Page> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.governor.throttle(self.source.host_key()).await;

            match self.source.fetch_page(page).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        host = self.source.host_key(),
                        page,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Page fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
