//! Persistent catalog store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_common::CatalogRecord;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};

/// Postgres caps bind parameters at 65535 per statement; six per row
pub const MAX_ROWS_PER_STATEMENT: usize = 10_000;

/// Write seam for the batch synchronizer
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or fully replace `rows`, keyed by `url_slug`.
    ///
    /// `rows` must not repeat a slug. Returns the number of rows written.
    async fn upsert_batch(&self, rows: &[CatalogRecord]) -> Result<u64>;
}

#[async_trait]
impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    async fn upsert_batch(&self, rows: &[CatalogRecord]) -> Result<u64> {
        (**self).upsert_batch(rows).await
    }
}

/// [`CatalogStore`] on the `products` table
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
    timeout: Duration,
    chunk_size: usize,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            chunk_size: MAX_ROWS_PER_STATEMENT,
        }
    }

    /// Rows per `INSERT` statement, clamped to `1..=MAX_ROWS_PER_STATEMENT`
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_ROWS_PER_STATEMENT);
        self
    }

    /// Open a pool against `database_url`
    pub async fn connect(database_url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await
            .map_err(IngestError::from_store)?;

        info!(max_connections, "Connected to catalog database");
        Ok(Self::new(pool, timeout))
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IngestError::StoreUnavailable(format!("Migration failed: {}", e)))?;
        info!("Catalog schema is up to date");
        Ok(())
    }

    /// All chunks of one batch commit together or not at all
    async fn upsert_chunks(&self, rows: &[CatalogRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(IngestError::from_store)?;

        let total_chunks = rows.len().div_ceil(self.chunk_size);
        let mut affected = 0;

        for (chunk_idx, chunk) in rows.chunks(self.chunk_size).enumerate() {
            if total_chunks > 1 {
                debug!(chunk = chunk_idx + 1, total_chunks, rows = chunk.len(), "Upserting chunk");
            }
            let result = upsert_query(chunk)
                .build()
                .execute(&mut *tx)
                .await
                .map_err(IngestError::from_store)?;
            affected += result.rows_affected();
        }

        tx.commit().await.map_err(IngestError::from_store)?;
        Ok(affected)
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_batch(&self, rows: &[CatalogRecord]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let affected = match tokio::time::timeout(self.timeout, self.upsert_chunks(rows)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(IngestError::StoreUnavailable(format!(
                    "Upsert timed out after {}s",
                    self.timeout.as_secs()
                )))
            },
        };

        debug!(affected, "Upserted batch");
        Ok(affected)
    }
}

fn upsert_query(rows: &[CatalogRecord]) -> QueryBuilder<'_, Postgres> {
    let mut query_builder = QueryBuilder::new(
        r#"
        INSERT INTO products (
            id,
            brand,
            product_name,
            product_numbers,
            thumbnail_url,
            url_slug
        )
        "#,
    );

    query_builder.push_values(rows, |mut b, row| {
        b.push_bind(&row.id)
            .push_bind(&row.brand)
            .push_bind(&row.product_name)
            .push_bind(&row.product_numbers)
            .push_bind(&row.thumbnail_url)
            .push_bind(&row.url_slug);
    });

    query_builder.push(
        r#"
        ON CONFLICT (url_slug)
        DO UPDATE SET
            id = EXCLUDED.id,
            brand = EXCLUDED.brand,
            product_name = EXCLUDED.product_name,
            product_numbers = EXCLUDED.product_numbers,
            thumbnail_url = EXCLUDED.thumbnail_url,
            updated_at = NOW()
        "#,
    );

    query_builder
}
