//! Local filesystem object store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crawlrelay_shared::{RelayError, Result};

use crate::ObjectStore;

/// Stores `bucket/key` at `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object to a path under the root. Keys that would escape it
    /// are rejected.
    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key.trim_start_matches('/'));
        let escapes = bucket.is_empty()
            || bucket.contains('/')
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RelayError::Unsupported(format!(
                "object '{bucket}/{key}' resolves outside the store root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn backend(&self) -> &str {
        "local"
    }

    async fn upload_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        let target = self.resolve(bucket, key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RelayError::io(parent, e))?;
        }
        fs::copy(local_path, &target)
            .await
            .map_err(|e| RelayError::io(local_path, e))?;
        debug!(target = %target.display(), "stored object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_under_bucket_and_key() {
        let scratch = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let src = scratch.path().join("page.html");
        fs::write(&src, "<p>hi</p>").await.unwrap();

        let store = LocalObjectStore::new(root.path());
        store
            .upload_object(&src, "bucket", "out/job-1/page.html")
            .await
            .unwrap();

        let stored = fs::read_to_string(root.path().join("bucket/out/job-1/page.html"))
            .await
            .unwrap();
        assert_eq!(stored, "<p>hi</p>");
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let scratch = tempfile::tempdir().unwrap();
        let src = scratch.path().join("f.txt");
        fs::write(&src, "x").await.unwrap();

        let store = LocalObjectStore::new(scratch.path().join("root"));
        for (bucket, key) in [("bucket", "../../etc/passwd"), ("..", "x"), ("", "x")] {
            assert!(
                store.upload_object(&src, bucket, key).await.is_err(),
                "{bucket}/{key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn missing_source_is_an_io_error() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        let err = store
            .upload_object(Path::new("/nonexistent/crawlrelay/file"), "bucket", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Io { .. }));
    }
}
