//! S3-compatible object store (`s3` feature).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crawlrelay_shared::{ObjectStoreConfig, RelayError, Result};

use crate::ObjectStore;

/// Amazon S3 (or a compatible endpoint) via the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from the `[object_store]` section.
    ///
    /// Static credentials come from the configured env vars when both are set;
    /// otherwise the SDK's default provider chain applies.
    pub async fn from_config(config: &ObjectStoreConfig) -> Result<Self> {
        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "initializing S3 object store"
        );

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        let access_key = std::env::var(&config.access_key_env).ok();
        let secret_key = std::env::var(&config.secret_key_env).ok();
        if let (Some(access_key), Some(secret_key)) = (access_key, secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "crawlrelay-env",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend(&self) -> &str {
        "s3"
    }

    async fn upload_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| RelayError::Remote(format!("read {}: {e}", local_path.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                RelayError::Remote(format!("put s3://{bucket}/{key}: {}", DisplayErrorContext(e)))
            })?;

        debug!(bucket, key, "uploaded object");
        Ok(())
    }
}
