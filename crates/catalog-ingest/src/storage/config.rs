use std::time::Duration;

use crate::error::{IngestError, Result};

pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const DEFAULT_S3_BUCKET: &str = "product-images";
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the S3-compatible blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Custom endpoint (MinIO, Supabase storage); `None` means AWS
    pub endpoint: Option<String>,
    pub region: String,
    /// Bucket that relocated images are written to
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Prefix of public object URLs: `<public_base_url>/<bucket>/<path>`
    pub public_base_url: String,
    /// Upper bound on any single storage call
    pub timeout: Duration,
}

impl StorageConfig {
    /// Read `CATALOG_S3_*` settings through `lookup`.
    ///
    /// Credentials fall back to the standard `AWS_*` variables; missing
    /// credentials are a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_key = get("CATALOG_S3_ACCESS_KEY")
            .or_else(|| get("AWS_ACCESS_KEY_ID"))
            .ok_or_else(|| IngestError::Config("CATALOG_S3_ACCESS_KEY is not set".to_string()))?;
        let secret_key = get("CATALOG_S3_SECRET_KEY")
            .or_else(|| get("AWS_SECRET_ACCESS_KEY"))
            .ok_or_else(|| IngestError::Config("CATALOG_S3_SECRET_KEY is not set".to_string()))?;

        let endpoint = get("CATALOG_S3_ENDPOINT");
        let region = get("CATALOG_S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string());
        let public_base_url = get("CATALOG_PUBLIC_BASE_URL")
            .unwrap_or_else(|| default_public_base_url(endpoint.as_deref(), &region));

        let path_style = match get("CATALOG_S3_PATH_STYLE") {
            Some(value) => value.parse().map_err(|_| {
                IngestError::Config(format!("CATALOG_S3_PATH_STYLE must be true or false, got '{}'", value))
            })?,
            None => endpoint.is_some(),
        };

        let config = Self {
            endpoint,
            region,
            bucket: get("CATALOG_S3_BUCKET").unwrap_or_else(|| DEFAULT_S3_BUCKET.to_string()),
            access_key,
            secret_key,
            path_style,
            public_base_url,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        };

        config.validate()?;
        Ok(config)
    }

    /// Local MinIO with its stock credentials
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            public_base_url: endpoint.clone(),
            endpoint: Some(endpoint),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(IngestError::Config("Storage bucket cannot be empty".to_string()));
        }
        if !self.public_base_url.starts_with("http://") && !self.public_base_url.starts_with("https://") {
            return Err(IngestError::Config(format!(
                "Public base URL must be absolute, got '{}'",
                self.public_base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(IngestError::Config("Storage timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}

fn default_public_base_url(endpoint: Option<&str>, region: &str) -> String {
    match endpoint {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://s3.{}.amazonaws.com", region),
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

    #[test]
    fn test_missing_credentials() {
        let err = StorageConfig::from_lookup(lookup(&[("CATALOG_S3_SECRET_KEY", "s")])).unwrap_err();
        assert!(err.to_string().contains("CATALOG_S3_ACCESS_KEY"));
    }

    #[test]
    fn test_aws_credential_fallback() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "key"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("CATALOG_S3_REGION", "ap-northeast-2"),
        ]))
        .unwrap();

        assert_eq!(config.access_key, "key");
        assert_eq!(config.endpoint, None);
        assert!(!config.path_style);
        assert_eq!(config.public_base_url, "https://s3.ap-northeast-2.amazonaws.com");
        assert_eq!(config.bucket, DEFAULT_S3_BUCKET);
    }

    #[test]
    fn test_custom_endpoint_defaults_to_path_style() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("CATALOG_S3_ACCESS_KEY", "key"),
            ("CATALOG_S3_SECRET_KEY", "secret"),
            ("CATALOG_S3_ENDPOINT", "http://localhost:9000/"),
            ("CATALOG_S3_BUCKET", "images"),
        ]))
        .unwrap();

        assert!(config.path_style);
        assert_eq!(config.public_base_url, "http://localhost:9000");
        assert_eq!(config.bucket, "images");
    }

    #[test]
    fn test_invalid_path_style() {
        let result = StorageConfig::from_lookup(lookup(&[
            ("CATALOG_S3_ACCESS_KEY", "key"),
            ("CATALOG_S3_SECRET_KEY", "secret"),
            ("CATALOG_S3_PATH_STYLE", "sometimes"),
        ]));
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000", "test-bucket");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.path_style);
        assert!(config.validate().is_ok());
    }
}
