//! Externally visible results: launch acknowledgments, status reports,
//! upload counters, and completion records.

use serde::{Deserialize, Serialize};

use crate::types::JobStatus;

/// Immediate reply to a launch. The caller does not wait for completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchAck {
    pub id: String,
    pub status: JobStatus,
    /// Final per-job destination (`<locator><id>/`).
    pub target_uri: String,
    pub message: String,
}

/// Normalized answer to a one-off status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusReport {
    HtmlCrawl {
        id: String,
        status: JobStatus,
        completed_urls: u64,
        total_urls: u64,
    },
    FullTextSynthesis {
        id: String,
        status: JobStatus,
        /// Present only once the job has completed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Error {
        error: String,
    },
}

impl StatusReport {
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { error: msg.into() }
    }

    /// The reported status, or `None` for an error report.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            Self::HtmlCrawl { status, .. } | Self::FullTextSynthesis { status, .. } => {
                Some(*status)
            }
            Self::Error { .. } => None,
        }
    }
}

/// Aggregate counters for one directory upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    pub uploaded_files: usize,
    pub failed_files: usize,
    pub total_bytes: u64,
}

/// Counters that only make sense for one job kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KindCounters {
    HtmlCrawl {
        completed_urls: u64,
        total_urls: u64,
    },
    FullTextSynthesis {
        processed_urls_count: usize,
    },
}

/// Successful end of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJob {
    pub id: String,
    /// Per-job destination the files were uploaded under.
    pub target_uri: String,
    /// Files written to the scratch directory.
    pub file_count: usize,
    pub uploaded_files: usize,
    pub failed_uploads: usize,
    pub upload_size_bytes: u64,
    #[serde(flatten)]
    pub counters: KindCounters,
    /// Seconds since polling began.
    pub elapsed_time: f64,
}

/// Final outcome of a job's background pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CompletionRecord {
    Completed(CompletedJob),
    TimedOut {
        id: String,
        error: String,
        elapsed_time: f64,
    },
    Failed {
        id: String,
        error: String,
    },
}

impl CompletionRecord {
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failed {
            id: id.into(),
            error: error.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Completed(job) => &job.id,
            Self::TimedOut { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed(_) => JobStatus::Completed,
            Self::TimedOut { .. } => JobStatus::TimedOut,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::TimedOut { error, .. } | Self::Failed { error, .. } => Some(error),
        }
    }
}
