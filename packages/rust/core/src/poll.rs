//! Deadline-bounded completion polling.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crawlrelay_firecrawl::JobService;
use crawlrelay_shared::{JobKind, JobSnapshot, JobStatus, RelaySettings, Result};

use crate::progress::ProgressReporter;

/// Interval and deadline for one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&RelaySettings> for PollSettings {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            interval: settings.poll_interval,
            timeout: settings.poll_timeout,
        }
    }
}

/// How polling ended. None of these is an error.
#[derive(Debug)]
pub enum PollOutcome {
    Completed {
        snapshot: JobSnapshot,
        elapsed: Duration,
    },
    /// Deadline passed while the job was still unfinished.
    TimedOut { elapsed: Duration },
    /// The service reported the job as failed or cancelled.
    Failed { elapsed: Duration },
}

/// Check the job every `interval` until it completes, fails remotely, or
/// `timeout` has elapsed.
///
/// A failed status call is returned as an error; there are no retries.
#[instrument(skip_all, fields(job_id = %id, kind = %kind))]
pub async fn poll_until_complete(
    service: &dyn JobService,
    id: &str,
    kind: JobKind,
    settings: PollSettings,
    progress: &dyn ProgressReporter,
) -> Result<PollOutcome> {
    let start = Instant::now();

    loop {
        let snapshot = service.job_status(id, kind).await?;
        let status = snapshot.status();
        let elapsed = start.elapsed();
        progress.polled(id, status, elapsed);

        match status {
            JobStatus::Completed => return Ok(PollOutcome::Completed { snapshot, elapsed }),
            JobStatus::Failed => return Ok(PollOutcome::Failed { elapsed }),
            _ if elapsed > settings.timeout => return Ok(PollOutcome::TimedOut { elapsed }),
            _ => {}
        }

        debug!(
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "job not finished, waiting"
        );
        tokio::time::sleep(settings.interval).await;
    }
}
