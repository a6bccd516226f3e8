//! Launching jobs and supervising their background completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crawlrelay_firecrawl::JobService;
use crawlrelay_objectstore::ObjectStore;
use crawlrelay_shared::{
    CompletionRecord, Job, JobKind, JobStatus, LaunchAck, LaunchParams, RelayError, RelaySettings,
    Result, StatusReport, StorageLocator,
};
use crawlrelay_storage::JobStore;
use uuid::Uuid;

use crate::pipeline::{PipelineContext, complete_job};
use crate::probe;
use crate::progress::{ProgressReporter, SilentProgress};

/// Time allowed past the polling deadline for materializing and uploading.
const COMPLETION_GRACE: Duration = Duration::from_secs(30 * 60);

// ---------------------------------------------------------------------------
// Requests and handles
// ---------------------------------------------------------------------------

/// What to launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub source_url: String,
    /// Raw storage locator as supplied by the caller.
    pub locator: String,
    pub params: LaunchParams,
}

impl LaunchRequest {
    pub fn html_crawl(source_url: impl Into<String>, locator: impl Into<String>, limit: u32) -> Self {
        Self {
            source_url: source_url.into(),
            locator: locator.into(),
            params: LaunchParams::html_crawl(limit),
        }
    }

    pub fn full_text(source_url: impl Into<String>, locator: impl Into<String>, max_urls: u32) -> Self {
        Self {
            source_url: source_url.into(),
            locator: locator.into(),
            params: LaunchParams::full_text(max_urls),
        }
    }
}

/// Result of a successful launch.
#[derive(Debug)]
pub struct Launched {
    /// Immediate reply for the caller.
    pub ack: LaunchAck,
    /// The background completion task. Dropping it does not stop the task.
    pub handle: CompletionHandle,
}

/// Handle to a job's background completion task.
#[derive(Debug)]
pub struct CompletionHandle {
    job_id: String,
    task: JoinHandle<CompletionRecord>,
}

impl CompletionHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop local work. The remote job keeps running.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the final record. An aborted or panicked task yields a
    /// `failed` record.
    pub async fn wait(self) -> CompletionRecord {
        let Self { job_id, task } = self;
        match task.await {
            Ok(record) => record,
            Err(e) if e.is_cancelled() => {
                CompletionRecord::failed(job_id, "completion task was aborted")
            }
            Err(e) => CompletionRecord::failed(job_id, format!("completion task panicked: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Launches remote jobs and relays their results to object storage.
///
/// Cheap to clone; every spawned completion task holds its own clone.
#[derive(Clone)]
pub struct Relay {
    service: Arc<dyn JobService>,
    store: Arc<dyn ObjectStore>,
    journal: Option<Arc<JobStore>>,
    progress: Arc<dyn ProgressReporter>,
    settings: Arc<RelaySettings>,
    /// Identifies this relay in journal leases.
    owner: Arc<str>,
}

impl Relay {
    pub fn new(
        service: Arc<dyn JobService>,
        store: Arc<dyn ObjectStore>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            service,
            store,
            journal: None,
            progress: Arc::new(SilentProgress),
            settings: Arc::new(settings),
            owner: Arc::from(Uuid::now_v7().to_string()),
        }
    }

    /// Record launches and completion records in `journal`.
    pub fn with_journal(mut self, journal: Arc<JobStore>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// End of the completion lease for a pipeline starting now.
    fn lease_until(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.settings.poll_timeout + COMPLETION_GRACE)
            .unwrap_or(chrono::Duration::days(365));
        Utc::now()
            .checked_add_signed(lease)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn journal(&self) -> Result<&JobStore> {
        self.journal
            .as_deref()
            .ok_or_else(|| RelayError::config("no job journal configured"))
    }

    /// Start a remote job and schedule its completion in the background.
    ///
    /// Checks run in order: credential, locator, then exactly one start call.
    /// Returns as soon as the service has issued a job id.
    #[instrument(skip_all, fields(source_url = %request.source_url, kind = %request.params.kind()))]
    pub async fn launch(&self, request: LaunchRequest) -> Result<Launched> {
        self.service.check_credential()?;
        let locator = StorageLocator::parse(&request.locator, &self.settings.locator_scheme)?;

        let started = self
            .service
            .start_job(&request.source_url, &request.params)
            .await?;
        let Some(id) = started.id else {
            return Err(RelayError::LaunchRejected {
                payload: started.raw.to_string(),
            });
        };
        // The id becomes a path segment of the upload prefix
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(RelayError::LaunchRejected {
                payload: started.raw.to_string(),
            });
        }

        let job = Job {
            id,
            kind: request.params.kind(),
            source_url: request.source_url,
            target_uri: locator,
            status: JobStatus::Pending,
            params: request.params,
            created_at: Utc::now(),
        };
        info!(job_id = %job.id, destination = %job.destination(), "job started");

        if let Some(journal) = &self.journal {
            let journaled = match journal.insert_job(&job).await {
                Ok(()) => journal.claim_job(&job.id, &self.owner, self.lease_until()).await,
                Err(e) => Err(e),
            };
            if let Err(e) = journaled {
                warn!(job_id = %job.id, error = %e, "could not journal launched job");
            }
        }

        let ack = LaunchAck {
            id: job.id.clone(),
            status: job.status,
            target_uri: job.destination().to_string(),
            message: launch_message(job.kind),
        };
        let handle = self.spawn_completion(job);
        Ok(Launched { ack, handle })
    }

    /// Spawn the completion pipeline for an already launched job.
    pub fn spawn_completion(&self, job: Job) -> CompletionHandle {
        let job_id = job.id.clone();
        let relay = self.clone();
        let task = tokio::spawn(async move { relay.run_completion(job).await });
        CompletionHandle { job_id, task }
    }

    async fn run_completion(self, job: Job) -> CompletionRecord {
        let ctx = PipelineContext {
            service: self.service.as_ref(),
            store: self.store.as_ref(),
            settings: &self.settings,
            progress: self.progress.as_ref(),
            journal: self.journal.as_deref(),
        };
        let record = complete_job(&ctx, &job).await;

        let rendered = serde_json::to_string(&record).unwrap_or_default();
        match record.error() {
            None => info!(job_id = %job.id, record = %rendered, "job relayed"),
            Some(error) => warn!(job_id = %job.id, status = %record.status(), error, "job not relayed"),
        }

        if let Some(journal) = &self.journal {
            match journal.finish_job(&record).await {
                Ok(true) => {}
                Ok(false) => warn!(job_id = %job.id, "job unknown or already recorded, record not stored"),
                Err(e) => warn!(job_id = %job.id, error = %e, "could not journal completion record"),
            }
        }

        self.progress.done(&record);
        record
    }

    /// Stop completing a launched job here and hand it over to a later
    /// `resume`.
    pub async fn detach(&self, handle: CompletionHandle) -> Result<()> {
        handle.abort();
        if let Some(journal) = &self.journal {
            journal.release_job(handle.job_id(), &self.owner).await?;
        }
        debug!(job_id = %handle.job_id(), "completion detached");
        Ok(())
    }

    /// One-off status query. Never fails; faults come back as error reports.
    pub async fn check_status(&self, id: &str, kind: &str) -> StatusReport {
        let report = probe::check_status(self.service.as_ref(), id, kind).await;

        if let (Some(journal), Some(status)) = (&self.journal, report.status()) {
            if let Err(e) = journal.update_status(id, status).await {
                debug!(job_id = %id, error = %e, "could not journal observed status");
            }
        }
        report
    }

    /// Final record of a journaled job; `None` while it is still in flight.
    pub async fn completion(&self, id: &str) -> Result<Option<CompletionRecord>> {
        self.journal()?.get_completion(id).await
    }

    /// A journaled job.
    pub async fn job(&self, id: &str) -> Result<Job> {
        self.journal()?
            .get_job(id)
            .await?
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    /// All journaled jobs, newest first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.journal()?.list_jobs().await
    }

    /// Re-attach completion tasks to journaled jobs that never got a record,
    /// e.g. because the launching process exited.
    ///
    /// Only jobs whose lease could be taken are resumed; a job another relay
    /// is still completing is left alone until its lease expires.
    pub async fn resume_unfinished(&self) -> Result<Vec<CompletionHandle>> {
        let journal = self.journal()?;
        let jobs = journal.list_unfinished().await?;

        let mut handles = Vec::new();
        for job in jobs {
            if journal.claim_job(&job.id, &self.owner, self.lease_until()).await? {
                handles.push(self.spawn_completion(job));
            } else {
                debug!(job_id = %job.id, "job is leased to another relay, not resuming");
            }
        }
        info!(count = handles.len(), "resumed unfinished jobs");
        Ok(handles)
    }

    /// Ask the service to stop a job (html-crawl only).
    #[instrument(skip_all, fields(job_id = %id))]
    pub async fn cancel(&self, id: &str, kind: &str) -> Result<JobStatus> {
        let kind: JobKind = kind.parse()?;
        self.service.check_credential()?;
        let status = self.service.cancel_job(id, kind).await?;
        info!(status = %status, "cancel requested");

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.update_status(id, status).await {
                debug!(error = %e, "could not journal cancellation");
            }
        }
        Ok(status)
    }
}

fn launch_message(kind: JobKind) -> String {
    let what = match kind {
        JobKind::HtmlCrawl => "Crawl",
        JobKind::FullTextSynthesis => "Full-text generation",
    };
    format!("{what} started and will be processed automatically when complete")
}
