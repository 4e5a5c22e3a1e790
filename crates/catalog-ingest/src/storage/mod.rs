//! Owned blob storage for product images

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};

pub mod config;

pub use config::StorageConfig;

/// Content type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object bytes plus content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Blob store seam used by relocation and bucket migration
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Every object key under `prefix`, across all listing pages
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn download(&self, bucket: &str, path: &str) -> Result<Asset>;

    /// Write `asset` at `path`, replacing any existing object
    async fn upload(&self, bucket: &str, path: &str, asset: Asset) -> Result<()>;

    /// Stable public URL of an object
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// [`BlobStore`] over any S3-compatible service
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    public_base_url: String,
    timeout: Duration,
}

impl S3BlobStore {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "catalog-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        info!(
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            bucket = %config.bucket,
            "Storage client initialized"
        );

        Self {
            client: Client::from_conf(s3_config_builder.build()),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        }
    }

    /// Run one storage call under the configured timeout
    async fn timed<T, E, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(IngestError::AssetUnavailable(format!("{} failed: {}", operation, e))),
            Err(_) => Err(IngestError::AssetUnavailable(format!(
                "{} timed out after {}s",
                operation,
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = self.timed("list", request.send()).await?;
            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(bucket, prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn download(&self, bucket: &str, path: &str) -> Result<Asset> {
        let call = async {
            let response = self
                .client
                .get_object()
                .bucket(bucket)
                .key(path)
                .send()
                .await
                .map_err(|e| e.to_string())?;

            let content_type = response
                .content_type()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            let bytes = response
                .body
                .collect()
                .await
                .map_err(|e| e.to_string())?
                .into_bytes()
                .to_vec();

            Ok::<_, String>(Asset {
                bytes,
                content_type,
            })
        };

        let asset = self.timed("download", call).await?;
        debug!(bucket, path, size = asset.bytes.len(), "Downloaded object");
        Ok(asset)
    }

    #[instrument(skip(self, asset), fields(size = asset.bytes.len()))]
    async fn upload(&self, bucket: &str, path: &str, asset: Asset) -> Result<()> {
        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(path)
            .content_type(asset.content_type)
            .body(ByteStream::from(asset.bytes));

        self.timed("upload", request.send()).await?;
        debug!(bucket, path, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, path.trim_start_matches('/'))
    }
}
