//! HTTP client for the Firecrawl v1 API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crawlrelay_shared::{
    CrawlSnapshot, FirecrawlConfig, JobKind, JobSnapshot, JobStatus, LaunchParams, RelayError,
    Result, SynthesisSnapshot, resolve_secret,
};

use crate::wire::{
    self, CrawlRequest, CrawlStatusResponse, LlmsTxtRequest, LlmsTxtStatusResponse, ScrapeOptions,
};
use crate::{JobService, StartedJob};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("crawlrelay/", env!("CARGO_PKG_VERSION"));

/// Upper bound on `next` links followed for one crawl.
const MAX_RESULT_PAGES: usize = 100;

/// Where the API key comes from.
#[derive(Debug, Clone)]
pub enum ApiKeySource {
    /// Read from this env var on every call.
    Env(String),
    /// Fixed key.
    Static(String),
}

impl ApiKeySource {
    fn resolve(&self) -> Result<String> {
        match self {
            Self::Env(var) => resolve_secret(var),
            Self::Static(key) => Ok(key.clone()),
        }
    }
}

/// Firecrawl v1 API client.
pub struct FirecrawlClient {
    client: Client,
    base_url: String,
    credential: ApiKeySource,
}

impl FirecrawlClient {
    /// Build a client from the `[firecrawl]` config section.
    ///
    /// The key itself is not read here; each request resolves it again.
    pub fn new(config: &FirecrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RelayError::Remote(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential: ApiKeySource::Env(config.api_key_env.clone()),
        })
    }

    /// Use a fixed key instead of the configured env var.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.credential = ApiKeySource::Static(key.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    /// Send an authenticated request and decode the JSON body.
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Value> {
        let key = self.credential.resolve()?;
        let resp = request
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| RelayError::Remote(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Remote(format!("HTTP {status} from {url}: {body}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| RelayError::Remote(format!("{url}: invalid JSON body: {e}")))
    }

    /// Like [`send`](Self::send), but a `{"success": false}` body is an error.
    async fn send_checked(&self, request: RequestBuilder, url: &str) -> Result<Value> {
        let raw = self.send(request, url).await?;
        match wire::api_failure(&raw) {
            Some(message) => Err(RelayError::Remote(format!("{url}: {message}"))),
            None => Ok(raw),
        }
    }

    #[instrument(skip_all, fields(job_id = %id))]
    async fn crawl_status(&self, id: &str) -> Result<CrawlSnapshot> {
        let url = self.endpoint(&format!("crawl/{id}"));
        let raw = self.send_checked(self.client.get(&url), &url).await?;
        let resp: CrawlStatusResponse = serde_json::from_value(raw)
            .map_err(|e| RelayError::Remote(format!("{url}: unexpected crawl status shape: {e}")))?;

        let snapshot = CrawlSnapshot {
            status: JobStatus::from_remote(resp.status.as_deref().unwrap_or_default()),
            completed: resp.completed.unwrap_or_default(),
            total: resp.total.unwrap_or_default(),
            pages: wire::parse_pages(resp.data.unwrap_or_default(), 0),
            next: resp.next,
        };
        debug!(
            status = %snapshot.status,
            completed = snapshot.completed,
            total = snapshot.total,
            pages = snapshot.pages.len(),
            "crawl status"
        );
        Ok(snapshot)
    }

    /// Follow `next` links until every document of the crawl is collected.
    #[instrument(skip_all, fields(pages = crawl.pages.len()))]
    async fn collect_pages(&self, mut crawl: CrawlSnapshot) -> Result<CrawlSnapshot> {
        let mut followed = 0;

        while let Some(next_url) = crawl.next.take() {
            if followed == MAX_RESULT_PAGES {
                warn!("too many result pages, keeping what was collected");
                break;
            }
            followed += 1;

            let raw = self.send_checked(self.client.get(&next_url), &next_url).await?;
            let page: CrawlStatusResponse = serde_json::from_value(raw).map_err(|e| {
                RelayError::Remote(format!("{next_url}: unexpected crawl page shape: {e}"))
            })?;
            let offset = crawl.pages.len();
            crawl
                .pages
                .extend(wire::parse_pages(page.data.unwrap_or_default(), offset));
            crawl.next = page.next;
        }

        debug!(pages = crawl.pages.len(), followed, "crawl results collected");
        Ok(crawl)
    }

    #[instrument(skip_all, fields(job_id = %id))]
    async fn synthesis_status(&self, id: &str) -> Result<SynthesisSnapshot> {
        let url = self.endpoint(&format!("llmstxt/{id}"));
        let raw = self.send_checked(self.client.get(&url), &url).await?;
        let resp: LlmsTxtStatusResponse = serde_json::from_value(raw).map_err(|e| {
            RelayError::Remote(format!("{url}: unexpected llmstxt status shape: {e}"))
        })?;

        let status = JobStatus::from_remote(resp.status.as_deref().unwrap_or_default());
        let (text, processed_urls) = resp.data.unwrap_or_default().into_text();
        debug!(status = %status, has_text = text.is_some(), "llmstxt status");

        Ok(SynthesisSnapshot {
            status,
            text,
            processed_urls,
        })
    }
}

#[async_trait]
impl JobService for FirecrawlClient {
    fn check_credential(&self) -> Result<()> {
        self.credential.resolve().map(|_| ())
    }

    #[instrument(skip_all, fields(source_url = %source_url, kind = %params.kind()))]
    async fn start_job(&self, source_url: &str, params: &LaunchParams) -> Result<StartedJob> {
        let (url, request) = match params {
            LaunchParams::HtmlCrawl { limit } => {
                let url = self.endpoint("crawl");
                let body = CrawlRequest {
                    url: source_url,
                    limit: *limit,
                    scrape_options: ScrapeOptions::html(),
                };
                let request = self.client.post(&url).json(&body);
                (url, request)
            }
            LaunchParams::FullTextSynthesis {
                max_urls,
                show_full_text,
            } => {
                let url = self.endpoint("llmstxt");
                let body = LlmsTxtRequest {
                    url: source_url,
                    max_urls: *max_urls,
                    show_full_text: *show_full_text,
                };
                let request = self.client.post(&url).json(&body);
                (url, request)
            }
        };

        let raw = self.send(request, &url).await?;
        let id = wire::job_id(&raw);
        debug!(job_id = ?id, "start request answered");
        Ok(StartedJob { id, raw })
    }

    async fn job_status(&self, id: &str, kind: JobKind) -> Result<JobSnapshot> {
        match kind {
            JobKind::HtmlCrawl => self.crawl_status(id).await.map(JobSnapshot::HtmlCrawl),
            JobKind::FullTextSynthesis => self
                .synthesis_status(id)
                .await
                .map(JobSnapshot::FullTextSynthesis),
        }
    }

    async fn collect_results(&self, snapshot: JobSnapshot) -> Result<JobSnapshot> {
        match snapshot {
            JobSnapshot::HtmlCrawl(crawl) => self.collect_pages(crawl).await.map(JobSnapshot::HtmlCrawl),
            synthesis @ JobSnapshot::FullTextSynthesis(_) => Ok(synthesis),
        }
    }

    #[instrument(skip_all, fields(job_id = %id, kind = %kind))]
    async fn cancel_job(&self, id: &str, kind: JobKind) -> Result<JobStatus> {
        if kind != JobKind::HtmlCrawl {
            return Err(RelayError::Unsupported(format!(
                "{kind} jobs cannot be cancelled remotely"
            )));
        }

        let url = self.endpoint(&format!("crawl/{id}"));
        let raw = self.send_checked(self.client.delete(&url), &url).await?;
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .map(JobStatus::from_remote)
            .unwrap_or(JobStatus::Failed);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FirecrawlClient {
        let config = FirecrawlConfig {
            base_url: server.uri(),
            ..FirecrawlConfig::default()
        };
        FirecrawlClient::new(&config)
            .expect("build client")
            .with_api_key("fc-test")
    }

    #[tokio::test]
    async fn start_crawl_sends_html_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/crawl"))
            .and(header("authorization", "Bearer fc-test"))
            .and(body_json(json!({
                "url": "https://example.com",
                "limit": 3,
                "scrapeOptions": {"formats": ["html"]}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "id": "crawl-1", "url": "x"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let started = client_for(&server)
            .start_job("https://example.com", &LaunchParams::html_crawl(3))
            .await
            .unwrap();
        assert_eq!(started.id.as_deref(), Some("crawl-1"));
    }

    #[tokio::test]
    async fn start_llmstxt_requests_full_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/llmstxt"))
            .and(body_json(json!({
                "url": "https://example.com",
                "maxUrls": 10,
                "showFullText": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "id": "gen-1"})))
            .mount(&server)
            .await;

        let started = client_for(&server)
            .start_job("https://example.com", &LaunchParams::full_text(10))
            .await
            .unwrap();
        assert_eq!(started.id.as_deref(), Some("gen-1"));
    }

    #[tokio::test]
    async fn start_without_id_keeps_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/crawl"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "error": "quota exceeded"})),
            )
            .mount(&server)
            .await;

        let started = client_for(&server)
            .start_job("https://example.com", &LaunchParams::html_crawl(1))
            .await
            .unwrap();
        assert!(started.id.is_none());
        assert_eq!(started.raw["error"], "quota exceeded");
    }

    #[tokio::test]
    async fn http_errors_are_remote_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/crawl/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .job_status("broken", JobKind::HtmlCrawl)
            .await
            .unwrap_err();
        match err {
            RelayError::Remote(msg) => assert!(msg.contains("upstream down"), "{msg}"),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    async fn mount_paginated_crawl(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/crawl/big"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed",
                "completed": 3,
                "total": 3,
                "data": [
                    {"html": "<p>1</p>", "metadata": {"url": "https://example.com/1"}},
                    {"html": "<p>2</p>", "metadata": {"sourceURL": "https://example.com/2"}}
                ],
                "next": format!("{}/v1/crawl/big/page2", server.uri())
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn status_check_is_a_single_request() {
        let server = MockServer::start().await;
        mount_paginated_crawl(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/crawl/big/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(0)
            .mount(&server)
            .await;

        let snapshot = client_for(&server)
            .job_status("big", JobKind::HtmlCrawl)
            .await
            .unwrap();
        let JobSnapshot::HtmlCrawl(crawl) = snapshot else {
            panic!("expected crawl snapshot");
        };
        assert_eq!((crawl.completed, crawl.total), (3, 3));
        assert_eq!(crawl.pages.len(), 2);
        assert!(crawl.next.is_some());
    }

    #[tokio::test]
    async fn collecting_results_follows_next_links() {
        let server = MockServer::start().await;
        mount_paginated_crawl(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/crawl/big/page2"))
            .and(header("authorization", "Bearer fc-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed",
                "completed": 3,
                "total": 3,
                "data": [{"html": "<p>3</p>"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let snapshot = client.job_status("big", JobKind::HtmlCrawl).await.unwrap();
        let snapshot = client.collect_results(snapshot).await.unwrap();
        let JobSnapshot::HtmlCrawl(crawl) = snapshot else {
            panic!("expected crawl snapshot");
        };
        assert_eq!(crawl.status, JobStatus::Completed);
        assert_eq!(crawl.total, 3);
        assert_eq!(crawl.pages.len(), 3);
        assert_eq!(crawl.pages[1].source_url, "https://example.com/2");
        assert_eq!(crawl.pages[2].source_url, "page-2");
        assert!(crawl.next.is_none());
    }

    #[tokio::test]
    async fn running_crawl_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/crawl/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "scraping",
                "completed": 4,
                "total": 10
            })))
            .mount(&server)
            .await;

        let snapshot = client_for(&server)
            .job_status("busy", JobKind::HtmlCrawl)
            .await
            .unwrap();
        assert_eq!(snapshot.status(), JobStatus::Running);
        let JobSnapshot::HtmlCrawl(crawl) = snapshot else {
            panic!("expected crawl snapshot");
        };
        assert_eq!((crawl.completed, crawl.total), (4, 10));
    }

    #[tokio::test]
    async fn llmstxt_status_parses_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/llmstxt/gen-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "status": "completed",
                "data": {
                    "llmstxt": "# index",
                    "llmsfulltxt": "# Example\n\nfull text",
                    "processedUrls": ["https://example.com", "https://example.com/a"]
                }
            })))
            .mount(&server)
            .await;

        let snapshot = client_for(&server)
            .job_status("gen-1", JobKind::FullTextSynthesis)
            .await
            .unwrap();
        let JobSnapshot::FullTextSynthesis(synthesis) = snapshot else {
            panic!("expected synthesis snapshot");
        };
        assert_eq!(synthesis.text.as_deref(), Some("# Example\n\nfull text"));
        assert_eq!(synthesis.processed_urls.len(), 2);
    }

    #[tokio::test]
    async fn llmstxt_tolerates_null_processed_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/llmstxt/gen-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed",
                "data": {"llmsfulltxt": "# full", "processedUrls": null}
            })))
            .mount(&server)
            .await;

        let snapshot = client_for(&server)
            .job_status("gen-2", JobKind::FullTextSynthesis)
            .await
            .unwrap();
        assert_eq!(snapshot.status(), JobStatus::Completed);
        let JobSnapshot::FullTextSynthesis(synthesis) = snapshot else {
            panic!("expected synthesis snapshot");
        };
        assert_eq!(synthesis.text.as_deref(), Some("# full"));
        assert!(synthesis.processed_urls.is_empty());
    }

    #[tokio::test]
    async fn unsuccessful_status_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/llmstxt/gone"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "error": "Job not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .job_status("gone", JobKind::FullTextSynthesis)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Job not found"));
    }

    #[tokio::test]
    async fn missing_env_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = FirecrawlConfig {
            base_url: server.uri(),
            api_key_env: "CRAWLRELAY_TEST_NO_SUCH_FIRECRAWL_KEY".into(),
            ..FirecrawlConfig::default()
        };
        let client = FirecrawlClient::new(&config).unwrap();

        assert!(matches!(
            client.check_credential(),
            Err(RelayError::MissingCredential { .. })
        ));
        let err = client
            .start_job("https://example.com", &LaunchParams::html_crawl(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn cancel_only_for_crawls() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/crawl/crawl-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "cancelled"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.cancel_job("crawl-9", JobKind::HtmlCrawl).await.unwrap(),
            JobStatus::Failed
        );
        assert!(matches!(
            client.cancel_job("gen-1", JobKind::FullTextSynthesis).await,
            Err(RelayError::Unsupported(_))
        ));
    }
}
