//! Core domain types for remote crawl jobs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::locator::StorageLocator;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// Which remote operation a job runs. Decides the status shape and the
/// materialization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Crawl a site and keep each page's HTML.
    HtmlCrawl,
    /// Have the service synthesize one text document from a site.
    FullTextSynthesis,
}

impl JobKind {
    /// Canonical string form, also used as the journal column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HtmlCrawl => "html-crawl",
            Self::FullTextSynthesis => "full-text-synthesis",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "html-crawl" | "crawlhtml" => Ok(Self::HtmlCrawl),
            "full-text-synthesis" | "llmtxt" | "llmstxt" => Ok(Self::FullTextSynthesis),
            other => Err(RelayError::UnknownJobKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Normalized lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl JobStatus {
    /// Map a status string reported by the remote service.
    ///
    /// Unrecognized values are treated as `Pending`: the job exists but has
    /// not reported progress we understand.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" | "complete" | "done" | "succeeded" => Self::Completed,
            "scraping" | "processing" | "running" | "active" | "started" | "in_progress" => {
                Self::Running
            }
            "failed" | "cancelled" | "canceled" | "error" | "aborted" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed-out",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "timed-out" => Ok(Self::TimedOut),
            "failed" => Ok(Self::Failed),
            other => Err(RelayError::Storage(format!("unknown job status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// LaunchParams
// ---------------------------------------------------------------------------

/// Kind-specific parameters fixed at launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LaunchParams {
    HtmlCrawl {
        /// Maximum number of pages to crawl.
        limit: u32,
    },
    FullTextSynthesis {
        /// Maximum number of URLs the service may read.
        max_urls: u32,
        /// Ask for the full text rather than the summary index.
        show_full_text: bool,
    },
}

impl LaunchParams {
    pub fn html_crawl(limit: u32) -> Self {
        Self::HtmlCrawl { limit }
    }

    pub fn full_text(max_urls: u32) -> Self {
        Self::FullTextSynthesis {
            max_urls,
            show_full_text: true,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::HtmlCrawl { .. } => JobKind::HtmlCrawl,
            Self::FullTextSynthesis { .. } => JobKind::FullTextSynthesis,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One launched remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Remote-issued id.
    pub id: String,
    pub kind: JobKind,
    /// URL the job crawls or synthesizes from.
    pub source_url: String,
    /// Validated base locator; the job's files land under `target_uri/<id>/`.
    pub target_uri: StorageLocator,
    pub status: JobStatus,
    pub params: LaunchParams,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Final per-job upload destination.
    pub fn destination(&self) -> StorageLocator {
        self.target_uri.for_job(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Remote snapshots (parsed once at the client boundary)
// ---------------------------------------------------------------------------

/// One crawled page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// Origin URL (or `page-<index>` when the service omitted it).
    pub source_url: String,
    /// Raw markup; `None` when the page produced none.
    pub content: Option<String>,
}

/// Normalized html-crawl status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSnapshot {
    pub status: JobStatus,
    pub completed: u64,
    pub total: u64,
    /// Documents carried by this reading; may be only the first batch.
    pub pages: Vec<PageResult>,
    /// Link to the next batch of documents, if the service paginated them.
    pub next: Option<String>,
}

/// Normalized full-text-synthesis status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisSnapshot {
    pub status: JobStatus,
    /// Synthesized document, when the service has produced one.
    pub text: Option<String>,
    /// URLs that contributed to the text.
    pub processed_urls: Vec<String>,
}

/// A status reading for either job kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSnapshot {
    HtmlCrawl(CrawlSnapshot),
    FullTextSynthesis(SynthesisSnapshot),
}

impl JobSnapshot {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::HtmlCrawl(_) => JobKind::HtmlCrawl,
            Self::FullTextSynthesis(_) => JobKind::FullTextSynthesis,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::HtmlCrawl(s) => s.status,
            Self::FullTextSynthesis(s) => s.status,
        }
    }
}
