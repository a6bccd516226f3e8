//! Object storage backends and the directory uploader.
//!
//! - [`ObjectStore`]: one `upload_object` call per file
//! - [`LocalObjectStore`]: mirrors objects under a local root (default backend)
//! - `S3ObjectStore`: Amazon S3 or compatible endpoints (`s3` feature)
//! - [`upload_directory`]: recursive upload with per-file failure counting

mod local;
#[cfg(feature = "s3")]
mod s3;
mod upload;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use crawlrelay_shared::{ObjectStoreBackend, ObjectStoreConfig, Result, expand_home};

pub use local::LocalObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
pub use upload::upload_directory;

/// A bucket/key object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs (`"local"`, `"s3"`).
    fn backend(&self) -> &str;

    /// Upload one local file to `bucket/key`.
    async fn upload_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()>;
}

/// Build the configured backend.
pub async fn build_object_store(config: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        ObjectStoreBackend::Local => {
            let root = expand_home(&config.local_root);
            tracing::debug!(root = %root.display(), "using local object store");
            Ok(Arc::new(LocalObjectStore::new(root)))
        }
        #[cfg(feature = "s3")]
        ObjectStoreBackend::S3 => Ok(Arc::new(S3ObjectStore::from_config(config).await?)),
        #[cfg(not(feature = "s3"))]
        ObjectStoreBackend::S3 => Err(crawlrelay_shared::RelayError::Unsupported(
            "the s3 object store backend requires building with the `s3` feature".into(),
        )),
    }
}
