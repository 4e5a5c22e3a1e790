//! Ingestion configuration
//!
//! Everything is read from the process environment; the binary loads `.env`
//! into it once at startup. Each section has its own `from_lookup` so a
//! command only requires the settings it actually uses, and tests can feed a
//! map instead of the process env.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::fetch::{FetchPolicy, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT};
use crate::governor::{GovernorConfig, ASSET_HOST, HTML_CATALOG_HOST, SEARCH_API_HOST};
use crate::pipeline::DEFAULT_RELOCATION_WORKERS;
use crate::storage::StorageConfig;
use crate::sync::{DEFAULT_BATCH_PAUSE, DEFAULT_BATCH_SIZE};

// ============================================================================
// Defaults
// ============================================================================

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default bound on acquiring a connection and on each batch write.
pub const DEFAULT_DATABASE_TIMEOUT_SECS: u64 = 30;

/// Default search API endpoint.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.cacheby.com/search";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub relocation_workers: usize,
}

/// Full configuration for a scrape-and-sync run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub fetch: FetchPolicy,
    pub governor: GovernorConfig,
    pub search_endpoint: String,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database: DatabaseConfig::from_lookup(&lookup)?,
            storage: StorageConfig::from_lookup(&lookup)?,
            http: HttpConfig::from_lookup(&lookup)?,
            sync: SyncConfig::from_lookup(&lookup)?,
            fetch: fetch_policy_from_lookup(&lookup)?,
            governor: governor_from_lookup(&lookup)?,
            search_endpoint: Env(&lookup)
                .string("CATALOG_SEARCH_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_SEARCH_ENDPOINT.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;

        if self.database.max_connections == 0 {
            return Err(IngestError::Config("CATALOG_DB_MAX_CONNECTIONS must be greater than 0".to_string()));
        }
        if self.sync.batch_size == 0 {
            return Err(IngestError::Config("CATALOG_BATCH_SIZE must be greater than 0".to_string()));
        }
        if self.sync.relocation_workers == 0 {
            return Err(IngestError::Config("CATALOG_RELOCATION_WORKERS must be greater than 0".to_string()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(IngestError::Config("CATALOG_FETCH_MAX_ATTEMPTS must be greater than 0".to_string()));
        }
        if self.http.timeout.is_zero() || self.database.timeout.is_zero() {
            return Err(IngestError::Config("Timeouts must be greater than 0".to_string()));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// `DATABASE_URL` is required
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        Ok(Self {
            url: env
                .string("DATABASE_URL")
                .ok_or_else(|| IngestError::Config("DATABASE_URL is not set".to_string()))?,
            max_connections: env
                .parse("CATALOG_DB_MAX_CONNECTIONS")?
                .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            timeout: Duration::from_secs(
                env.parse("CATALOG_DB_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_DATABASE_TIMEOUT_SECS),
            ),
        })
    }
}

impl HttpConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        Ok(Self {
            timeout: env
                .parse("CATALOG_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            user_agent: env
                .string("CATALOG_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        Ok(Self {
            batch_size: env.parse("CATALOG_BATCH_SIZE")?.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_pause: env
                .parse("CATALOG_BATCH_PAUSE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BATCH_PAUSE),
            relocation_workers: env
                .parse("CATALOG_RELOCATION_WORKERS")?
                .unwrap_or(DEFAULT_RELOCATION_WORKERS),
        })
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            relocation_workers: DEFAULT_RELOCATION_WORKERS,
        }
    }
}

fn fetch_policy_from_lookup<F>(lookup: F) -> Result<FetchPolicy>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env(&lookup);
    let defaults = FetchPolicy::default();
    Ok(FetchPolicy {
        max_pages: defaults.max_pages,
        max_attempts: env.parse("CATALOG_FETCH_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
        base_backoff: env
            .parse("CATALOG_FETCH_BACKOFF_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_backoff),
    })
}

/// Governor intervals; unset variables keep the built-in spacing
pub fn governor_from_lookup<F>(lookup: F) -> Result<GovernorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env(&lookup);
    let mut config = GovernorConfig::default();

    for (var, host) in [
        ("CATALOG_SEARCH_INTERVAL_MS", SEARCH_API_HOST),
        ("CATALOG_HTML_INTERVAL_MS", HTML_CATALOG_HOST),
        ("CATALOG_ASSET_INTERVAL_MS", ASSET_HOST),
    ] {
        if let Some(ms) = env.parse::<u64>(var)? {
            config = config.with_interval(host, Duration::from_millis(ms));
        }
    }

    Ok(config)
}

/// Typed access to a key lookup
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.string(key) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| IngestError::Config(format!("{} has an invalid value: '{}'", key, raw))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/catalog"),
        ("CATALOG_S3_ACCESS_KEY", "key"),
        ("CATALOG_S3_SECRET_KEY", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.database.max_connections, DEFAULT_DATABASE_MAX_CONNECTIONS);
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.fetch, FetchPolicy::default());
        assert_eq!(config.http.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.search_endpoint, DEFAULT_SEARCH_ENDPOINT);
    }

    #[test]
    fn test_missing_database_url_is_fatal() {
        let err = IngestConfig::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_missing_storage_credentials_are_fatal() {
        let err = IngestConfig::from_lookup(lookup(&REQUIRED[..1])).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("CATALOG_BATCH_SIZE", "25"),
            ("CATALOG_BATCH_PAUSE_MS", "0"),
            ("CATALOG_RELOCATION_WORKERS", "1"),
            ("CATALOG_FETCH_MAX_ATTEMPTS", "5"),
            ("CATALOG_SEARCH_INTERVAL_MS", "750"),
        ]);
        let config = IngestConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.batch_pause, Duration::ZERO);
        assert_eq!(config.sync.relocation_workers, 1);
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(
            config.governor.intervals.get(SEARCH_API_HOST),
            Some(&Duration::from_millis(750))
        );
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("CATALOG_BATCH_SIZE", "fifty"));
        let err = IngestConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("CATALOG_BATCH_SIZE"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("CATALOG_BATCH_SIZE", "0"));
        assert!(IngestConfig::from_lookup(lookup(&vars)).is_err());
    }
}
