//! Progress callbacks for background completion pipelines.

use std::time::Duration;

use crawlrelay_shared::{CompletionRecord, JobStatus};

/// Progress callback for reporting pipeline status.
///
/// Called from background tasks, possibly for several jobs at once.
pub trait ProgressReporter: Send + Sync {
    /// Called when a job enters a new phase (`polling`, `materializing`, `uploading`).
    fn phase(&self, job_id: &str, name: &str);
    /// Called after every status check.
    fn polled(&self, job_id: &str, status: JobStatus, elapsed: Duration);
    /// Called once with the final record.
    fn done(&self, record: &CompletionRecord);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _job_id: &str, _name: &str) {}
    fn polled(&self, _job_id: &str, _status: JobStatus, _elapsed: Duration) {}
    fn done(&self, _record: &CompletionRecord) {}
}
