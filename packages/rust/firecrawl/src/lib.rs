//! Remote job service seam and its Firecrawl v1 implementation.
//!
//! This crate provides:
//! - [`JobService`]: the async trait the relay talks to
//! - [`FirecrawlClient`]: the HTTP implementation (`/v1/crawl`, `/v1/llmstxt`)
//!
//! Responses are parsed into [`JobSnapshot`] here, once, so nothing downstream
//! has to pick apart loosely shaped JSON.

mod client;
mod wire;

pub use client::{ApiKeySource, FirecrawlClient};

use async_trait::async_trait;
use crawlrelay_shared::{JobKind, JobSnapshot, JobStatus, LaunchParams, Result};

/// Reply to a start request.
#[derive(Debug, Clone)]
pub struct StartedJob {
    /// Job id, when the service issued one.
    pub id: Option<String>,
    /// The untouched response body, kept for `LaunchRejected` reporting.
    pub raw: serde_json::Value,
}

/// A remote service that runs crawl jobs asynchronously.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Fail with `MissingCredential` if no credential is currently available.
    fn check_credential(&self) -> Result<()>;

    /// Issue exactly one start request.
    async fn start_job(&self, source_url: &str, params: &LaunchParams) -> Result<StartedJob>;

    /// Fetch the current state of a job with a single request.
    async fn job_status(&self, id: &str, kind: JobKind) -> Result<JobSnapshot>;

    /// Fetch whatever part of a completed job's output the status reading
    /// left behind (paginated crawl documents).
    async fn collect_results(&self, snapshot: JobSnapshot) -> Result<JobSnapshot>;

    /// Ask the service to stop a job.
    async fn cancel_job(&self, id: &str, kind: JobKind) -> Result<JobStatus>;
}
