//! One-off status queries that never fail.

use tracing::debug;

use crawlrelay_firecrawl::JobService;
use crawlrelay_shared::{JobKind, JobSnapshot, JobStatus, StatusReport};

/// Query a job's status and normalize the answer.
///
/// `kind` is the caller's string. Every fault, including an unknown kind or a
/// missing credential, comes back as [`StatusReport::Error`].
pub async fn check_status(service: &dyn JobService, id: &str, kind: &str) -> StatusReport {
    let kind: JobKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return StatusReport::error(e.to_string()),
    };

    if let Err(e) = service.check_credential() {
        return StatusReport::error(e.to_string());
    }

    match service.job_status(id, kind).await {
        Ok(snapshot) => status_report(id, snapshot),
        Err(e) => {
            debug!(job_id = %id, error = %e, "status check failed");
            StatusReport::error(format!("Error checking {kind} status: {e}"))
        }
    }
}

/// Shape a snapshot as a report. Full text is only included once completed.
pub fn status_report(id: &str, snapshot: JobSnapshot) -> StatusReport {
    match snapshot {
        JobSnapshot::HtmlCrawl(crawl) => StatusReport::HtmlCrawl {
            id: id.to_string(),
            status: crawl.status,
            completed_urls: crawl.completed,
            total_urls: crawl.total,
        },
        JobSnapshot::FullTextSynthesis(synthesis) => StatusReport::FullTextSynthesis {
            id: id.to_string(),
            status: synthesis.status,
            text: synthesis
                .text
                .filter(|_| synthesis.status == JobStatus::Completed),
        },
    }
}
