//! Firecrawl v1 request bodies and lenient response shapes.
//!
//! Responses are decoded into `serde_json::Value` first and then picked apart,
//! so a single malformed page never fails a whole status call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crawlrelay_shared::PageResult;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CrawlRequest<'a> {
    pub url: &'a str,
    pub limit: u32,
    pub scrape_options: ScrapeOptions,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScrapeOptions {
    pub formats: Vec<&'static str>,
}

impl ScrapeOptions {
    pub fn html() -> Self {
        Self {
            formats: vec!["html"],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LlmsTxtRequest<'a> {
    pub url: &'a str,
    pub max_urls: u32,
    pub show_full_text: bool,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// `GET /v1/crawl/{id}` (and every `next` page of it).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CrawlStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub next: Option<String>,
}

/// `GET /v1/llmstxt/{id}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LlmsTxtStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<LlmsTxtData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LlmsTxtData {
    #[serde(default)]
    pub llmsfulltxt: Option<String>,
    #[serde(default)]
    pub llmstxt: Option<String>,
    #[serde(default)]
    pub processed_urls: Option<Vec<Value>>,
}

impl LlmsTxtData {
    /// The full text when present, else the summary index. Non-string
    /// entries of `processedUrls` are dropped.
    pub fn into_text(self) -> (Option<String>, Vec<String>) {
        let urls = self
            .processed_urls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|url| match url {
                Value::String(url) => Some(url),
                _ => None,
            })
            .collect();
        (self.llmsfulltxt.or(self.llmstxt), urls)
    }
}

/// Extract the job id from a start response.
pub(crate) fn job_id(raw: &Value) -> Option<String> {
    raw.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// The `error` message of a `{"success": false, ...}` body, if it is one.
pub(crate) fn api_failure(raw: &Value) -> Option<String> {
    if raw.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    Some(
        raw.get("error")
            .and_then(Value::as_str)
            .unwrap_or("request was not successful")
            .to_string(),
    )
}

/// Convert crawl documents to pages. `offset` keeps fallback names unique
/// across `next` pages. Non-object entries are dropped.
pub(crate) fn parse_pages(data: Vec<Value>, offset: usize) -> Vec<PageResult> {
    data.into_iter()
        .enumerate()
        .filter_map(|(i, doc)| {
            let doc = doc.as_object()?;
            let metadata = doc.get("metadata");
            let source_url = metadata
                .and_then(|m| m.get("url").or_else(|| m.get("sourceURL")))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("page-{}", offset + i));
            let content = doc.get("html").and_then(Value::as_str).map(str::to_string);
            Some(PageResult {
                source_url,
                content,
            })
        })
        .collect()
}
