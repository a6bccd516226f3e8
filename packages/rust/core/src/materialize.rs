//! Writing completed job payloads into a scratch directory.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, instrument, warn};

use crawlrelay_shared::{JobSnapshot, RelayError, RelaySettings, Result};

/// Scratch file naming rules.
#[derive(Debug, Clone)]
pub struct NamingPolicy {
    /// Sanitized names longer than this (in UTF-8 bytes) use the hashed form.
    pub max_filename_len: usize,
    /// Name of the single full-text output file.
    pub full_text_file_name: String,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

impl From<&RelaySettings> for NamingPolicy {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            max_filename_len: settings.max_filename_len,
            full_text_file_name: settings.full_text_file_name.clone(),
        }
    }
}

/// Strip the scheme and replace `/ ? & :` with `_`.
fn sanitize(url: &str) -> String {
    url.replace("https://", "")
        .replace("http://", "")
        .replace(['/', '?', '&', ':'], "_")
}

/// `<first '_' segment>_<md5(url) hex>.html`
fn hashed_name(url: &str, sanitized: &str) -> String {
    let domain = sanitized.split('_').next().unwrap_or_default();
    format!("{domain}_{:x}.html", md5::compute(url.as_bytes()))
}

/// Scratch file name for a crawled page.
pub fn page_file_name(url: &str, max_len: usize) -> String {
    let sanitized = sanitize(url);
    if sanitized.len() > max_len {
        hashed_name(url, &sanitized)
    } else {
        format!("{sanitized}.html")
    }
}

/// Write a completed payload into `dir` and return the number of files written.
///
/// Html crawls produce one file per page that has markup; a page whose file
/// cannot be written is logged and skipped. A synthesis produces one file when
/// text is present, else none.
#[instrument(skip_all, fields(dir = %dir.display(), kind = %snapshot.kind()))]
pub async fn materialize(snapshot: &JobSnapshot, dir: &Path, naming: &NamingPolicy) -> Result<usize> {
    let mut written = 0;

    match snapshot {
        JobSnapshot::HtmlCrawl(crawl) => {
            let mut used = HashSet::new();
            for page in &crawl.pages {
                let Some(html) = &page.content else {
                    debug!(url = %page.source_url, "page has no markup, skipping");
                    continue;
                };

                let mut name = page_file_name(&page.source_url, naming.max_filename_len);
                if used.contains(&name) {
                    let hashed = hashed_name(&page.source_url, &sanitize(&page.source_url));
                    let stem = hashed.trim_end_matches(".html").to_string();
                    name = hashed;
                    // Same URL crawled twice
                    let mut n = 1;
                    while used.contains(&name) {
                        name = format!("{stem}_{n}.html");
                        n += 1;
                    }
                }

                if let Err(e) = write_file(&dir.join(&name), html.as_bytes()).await {
                    warn!(url = %page.source_url, error = %e, "could not write page, skipping");
                    continue;
                }
                used.insert(name);
                written += 1;
            }
        }
        JobSnapshot::FullTextSynthesis(synthesis) => {
            if let Some(text) = &synthesis.text {
                write_file(&dir.join(&naming.full_text_file_name), text.as_bytes()).await?;
                written += 1;
            }
        }
    }

    debug!(files = written, "materialized");
    Ok(written)
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| RelayError::io(path, e))
}
