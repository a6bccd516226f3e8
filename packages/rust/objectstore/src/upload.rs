//! Recursive directory upload.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crawlrelay_shared::{StorageLocator, UploadStats};

use crate::ObjectStore;

/// Upload every file under `dir` to `destination`.
///
/// Keys are `destination.prefix()` plus the path relative to `dir`, with `\`
/// normalized to `/`. A failed upload is counted and the walk continues; this
/// function never fails.
#[instrument(skip_all, fields(dir = %dir.display(), destination = %destination, backend = store.backend()))]
pub async fn upload_directory(
    store: &dyn ObjectStore,
    dir: &Path,
    destination: &StorageLocator,
) -> UploadStats {
    let mut stats = UploadStats::default();
    let bucket = destination.bucket();
    let prefix = destination.prefix();

    for path in collect_files(dir).await {
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let key = format!("{prefix}{}", relative.to_string_lossy().replace('\\', "/"));

        match store.upload_object(&path, bucket, &key).await {
            Ok(()) => {
                stats.uploaded_files += 1;
                match fs::metadata(&path).await {
                    Ok(meta) => stats.total_bytes += meta.len(),
                    Err(e) => warn!(path = %path.display(), error = %e, "uploaded file has no readable size"),
                }
                debug!(key = %key, "uploaded");
            }
            Err(e) => {
                stats.failed_files += 1;
                warn!(key = %key, error = %e, "upload failed");
            }
        }
    }

    info!(
        uploaded = stats.uploaded_files,
        failed = stats.failed_files,
        bytes = stats.total_bytes,
        "directory upload finished"
    );
    stats
}

/// All regular files below `root`, sorted. Unreadable directories are skipped.
async fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => match entry.file_type().await {
                    Ok(kind) if kind.is_dir() => pending.push(entry.path()),
                    Ok(kind) if kind.is_file() => files.push(entry.path()),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "skipping unreadable entry")
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "directory listing interrupted");
                    break;
                }
            }
        }
    }

    files.sort();
    files
}
