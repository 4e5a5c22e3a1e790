//! Ingestion error taxonomy

use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised by the pipeline stages.
///
/// Only [`IngestError::Config`] is fatal for a run. Every other variant is
/// contained by the stage that produced it: the fetcher retries or truncates,
/// the relocator falls back to the upstream URL, the synchronizer skips the
/// batch.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure, timeout, 5xx, 408 or 429 from an upstream
    #[error("Transient upstream error: {0}")]
    TransientUpstream(String),

    /// Upstream answered, but with something we cannot use
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] catalog_common::CatalogError),
}

impl IngestError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::TransientUpstream(_))
    }

    /// Classify a reqwest failure from an upstream call
    pub fn from_upstream(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return IngestError::TransientUpstream(err.to_string());
        }

        match err.status() {
            Some(status) if is_retriable_status(status) => {
                IngestError::TransientUpstream(err.to_string())
            },
            _ => IngestError::Upstream(err.to_string()),
        }
    }

    /// Classify a non-2xx upstream response
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let message = format!("HTTP {} from {}", status, url);
        if is_retriable_status(status) {
            IngestError::TransientUpstream(message)
        } else {
            IngestError::Upstream(message)
        }
    }

    /// Classify a database failure from a batch write.
    ///
    /// Postgres integrity violations (SQLSTATE class `23`) are conflicts;
    /// everything else means the store could not take the write.
    pub fn from_store(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().is_some_and(|code| code.starts_with("23")) =>
            {
                IngestError::WriteConflict(db_err.message().to_string())
            },
            _ => IngestError::StoreUnavailable(err.to_string()),
        }
    }
}

/// 5xx, 408 Request Timeout and 429 Too Many Requests are worth retrying
pub fn is_retriable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}
