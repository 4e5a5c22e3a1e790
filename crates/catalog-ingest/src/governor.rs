//! Per-host outbound call spacing
//!
//! [`RateGovernor`] hands out call slots per host key. Each caller reserves
//! the next free slot while holding the lock, then sleeps until that slot
//! without the lock. Concurrent callers on the same host therefore land in
//! distinct slots at least one interval apart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Host key for the search API
pub const SEARCH_API_HOST: &str = "search-api";
/// Host key for the HTML catalog site
pub const HTML_CATALOG_HOST: &str = "html-catalog";
/// Host key for image downloads
pub const ASSET_HOST: &str = "assets";

pub const DEFAULT_SEARCH_API_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_HTML_CATALOG_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_ASSET_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_UNKNOWN_HOST_INTERVAL: Duration = Duration::from_millis(250);

/// Minimum spacing between calls, per host key
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub intervals: HashMap<String, Duration>,
    /// Used for host keys without an explicit interval
    pub default_interval: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        let intervals = [
            (SEARCH_API_HOST.to_string(), DEFAULT_SEARCH_API_INTERVAL),
            (HTML_CATALOG_HOST.to_string(), DEFAULT_HTML_CATALOG_INTERVAL),
            (ASSET_HOST.to_string(), DEFAULT_ASSET_INTERVAL),
        ]
        .into_iter()
        .collect();

        Self {
            intervals,
            default_interval: DEFAULT_UNKNOWN_HOST_INTERVAL,
        }
    }
}

impl GovernorConfig {
    pub fn with_interval(mut self, host_key: impl Into<String>, interval: Duration) -> Self {
        self.intervals.insert(host_key.into(), interval);
        self
    }

    /// No spacing at all, for tests and dry runs
    pub fn unthrottled() -> Self {
        Self {
            intervals: HashMap::new(),
            default_interval: Duration::ZERO,
        }
    }
}

/// Admission gate shared by the fetcher, the relocator and bucket migration
#[derive(Debug)]
pub struct RateGovernor {
    config: GovernorConfig,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval_for(&self, host_key: &str) -> Duration {
        self.config
            .intervals
            .get(host_key)
            .copied()
            .unwrap_or(self.config.default_interval)
    }

    /// Wait until a call to `host_key` is allowed. Returns the time waited.
    pub async fn throttle(&self, host_key: &str) -> Duration {
        let slot = self.reserve(host_key);
        let now = Instant::now();

        if slot <= now {
            return Duration::ZERO;
        }

        let wait = slot - now;
        trace!(host = host_key, wait_ms = wait.as_millis() as u64, "Throttling outbound call");
        tokio::time::sleep_until(slot).await;
        wait
    }

    fn reserve(&self, host_key: &str) -> Instant {
        let interval = self.interval_for(host_key);
        let now = Instant::now();

        // The map only holds instants; a panic elsewhere cannot leave it inconsistent.
        let mut slots = self
            .next_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let slot = match slots.get(host_key) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        slots.insert(host_key.to_string(), slot + interval);

        slot
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(GovernorConfig::default())
    }
}
