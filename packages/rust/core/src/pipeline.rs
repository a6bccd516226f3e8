//! Completion pipeline: poll → materialize → upload → record.

use std::path::Path;

use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crawlrelay_firecrawl::JobService;
use crawlrelay_objectstore::{ObjectStore, upload_directory};
use crawlrelay_shared::{
    CompletedJob, CompletionRecord, Job, JobSnapshot, JobStatus, KindCounters, RelayError,
    RelaySettings, Result,
};
use crawlrelay_storage::JobStore;

use crate::materialize::{NamingPolicy, materialize};
use crate::poll::{PollOutcome, PollSettings, poll_until_complete};
use crate::progress::ProgressReporter;

/// Everything one pipeline run borrows.
pub struct PipelineContext<'a> {
    pub service: &'a dyn JobService,
    pub store: &'a dyn ObjectStore,
    pub settings: &'a RelaySettings,
    pub progress: &'a dyn ProgressReporter,
    /// Receives status updates while the job is in flight.
    pub journal: Option<&'a JobStore>,
}

/// Drive one job to its final record. Never fails: every error becomes a
/// `failed` record.
#[instrument(skip_all, fields(job_id = %job.id, kind = %job.kind))]
pub async fn complete_job(ctx: &PipelineContext<'_>, job: &Job) -> CompletionRecord {
    match run(ctx, job).await {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "completion pipeline failed");
            CompletionRecord::failed(&job.id, e.to_string())
        }
    }
}

async fn run(ctx: &PipelineContext<'_>, job: &Job) -> Result<CompletionRecord> {
    let start = Instant::now();
    ctx.service.check_credential()?;

    // --- Phase 1: Polling ---
    ctx.progress.phase(&job.id, "polling");
    let outcome = poll_until_complete(
        ctx.service,
        &job.id,
        job.kind,
        PollSettings::from(ctx.settings),
        ctx.progress,
    )
    .await?;

    let snapshot = match outcome {
        PollOutcome::Completed { snapshot, elapsed } => {
            info!(elapsed_ms = elapsed.as_millis() as u64, "remote job completed");
            ctx.service.collect_results(snapshot).await?
        }
        PollOutcome::TimedOut { elapsed } => {
            return Ok(CompletionRecord::TimedOut {
                id: job.id.clone(),
                error: format!("Timeout waiting for job {} to complete", job.id),
                elapsed_time: elapsed.as_secs_f64(),
            });
        }
        PollOutcome::Failed { elapsed } => {
            return Ok(CompletionRecord::failed(
                &job.id,
                format!(
                    "Job {} failed on the remote service after {:.1}s",
                    job.id,
                    elapsed.as_secs_f64()
                ),
            ));
        }
    };

    if let Some(journal) = ctx.journal {
        if let Err(e) = journal.update_status(&job.id, JobStatus::Completed).await {
            warn!(error = %e, "could not record remote completion");
        }
    }

    // --- Phase 2: Materialize + upload inside one scratch directory ---
    let scratch = scratch_dir(ctx.settings.scratch_dir.as_deref())?;

    ctx.progress.phase(&job.id, "materializing");
    let file_count = materialize(&snapshot, scratch.path(), &NamingPolicy::from(ctx.settings)).await?;

    ctx.progress.phase(&job.id, "uploading");
    let destination = job.destination();
    let upload = upload_directory(ctx.store, scratch.path(), &destination).await;

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(path = %scratch_path.display(), error = %e, "could not remove scratch directory");
    }

    // --- Phase 3: Record ---
    let counters = match &snapshot {
        JobSnapshot::HtmlCrawl(crawl) => KindCounters::HtmlCrawl {
            completed_urls: crawl.completed,
            total_urls: crawl.total,
        },
        JobSnapshot::FullTextSynthesis(synthesis) => KindCounters::FullTextSynthesis {
            processed_urls_count: synthesis.processed_urls.len(),
        },
    };

    Ok(CompletionRecord::Completed(CompletedJob {
        id: job.id.clone(),
        target_uri: destination.to_string(),
        file_count,
        uploaded_files: upload.uploaded_files,
        failed_uploads: upload.failed_files,
        upload_size_bytes: upload.total_bytes,
        counters,
        elapsed_time: start.elapsed().as_secs_f64(),
    }))
}

/// Private per-job scratch directory, removed when dropped.
fn scratch_dir(parent: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("crawlrelay-");
    match parent {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(|e| RelayError::io(parent, e))?;
            builder.tempdir_in(parent).map_err(|e| RelayError::io(parent, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| RelayError::io(std::env::temp_dir(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::progress::SilentProgress;
    use crate::testing::{
        RecordingStore, ScriptedService, Step, completed_crawl, crawl_step, page, synthesis_step,
    };
    use crawlrelay_shared::{JobKind, LaunchParams, StorageLocator};

    fn job(kind: JobKind) -> Job {
        Job {
            id: "job-1".into(),
            kind,
            source_url: "https://example.com".into(),
            target_uri: StorageLocator::parse("store://bucket/out", "store").unwrap(),
            status: JobStatus::Pending,
            params: match kind {
                JobKind::HtmlCrawl => LaunchParams::html_crawl(10),
                JobKind::FullTextSynthesis => LaunchParams::full_text(10),
            },
            created_at: chrono::Utc::now(),
        }
    }

    fn settings(scratch: &Path) -> RelaySettings {
        RelaySettings {
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(25),
            locator_scheme: "store".into(),
            scratch_dir: Some(scratch.to_path_buf()),
            ..RelaySettings::default()
        }
    }

    async fn run_with(
        service: &ScriptedService,
        store: &RecordingStore,
        settings: &RelaySettings,
        job: &Job,
    ) -> CompletionRecord {
        let ctx = PipelineContext {
            service,
            store,
            settings,
            progress: &SilentProgress,
            journal: None,
        };
        complete_job(&ctx, job).await
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test(start_paused = true)]
    async fn crawl_pages_are_uploaded_under_job_prefix() {
        let scratch = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![
            crawl_step(JobStatus::Running, 1, 3),
            completed_crawl(vec![
                page("https://example.com/a", Some("<p>a</p>")),
                page("https://example.com/b", None),
                page("https://example.com/c", Some("<p>c</p>")),
            ]),
        ]);
        let store = RecordingStore::default();

        let record = run_with(&service, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;

        let CompletionRecord::Completed(done) = record else {
            panic!("expected a completed record");
        };
        assert_eq!(done.target_uri, "store://bucket/out/job-1/");
        assert_eq!(done.file_count, 2);
        assert_eq!(done.uploaded_files, 2);
        assert_eq!(done.failed_uploads, 0);
        assert_eq!(done.upload_size_bytes, 16);
        assert_eq!(
            done.counters,
            KindCounters::HtmlCrawl {
                completed_urls: 3,
                total_urls: 3
            }
        );
        assert_eq!(
            store.keys(),
            vec![
                "bucket/out/job-1/example.com_a.html".to_string(),
                "bucket/out/job-1/example.com_c.html".to_string(),
            ]
        );
        assert!(is_empty_dir(scratch.path()), "scratch directory leaked");
        assert_eq!(service.collections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn one_unwritable_page_leaves_the_rest_uploaded() {
        let scratch = tempfile::tempdir().unwrap();
        let long_unicode = format!("https://example.com/{}", "é".repeat(130));
        let service = ScriptedService::new(vec![completed_crawl(vec![
            page("https://example.com/a", Some("a")),
            page("https://example.com/bad\0name", Some("bad")),
            page(&long_unicode, Some("long")),
        ])]);
        let store = RecordingStore::default();

        let record = run_with(&service, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;
        let CompletionRecord::Completed(done) = record else {
            panic!("expected a completed record");
        };
        assert_eq!(done.file_count, 2);
        assert_eq!((done.uploaded_files, done.failed_uploads), (2, 0));
        assert_eq!(done.upload_size_bytes, 5);
        assert!(store.keys().contains(&"bucket/out/job-1/example.com_a.html".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn upload_failures_are_counted_not_fatal() {
        let scratch = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![completed_crawl(vec![
            page("https://example.com/ok", Some("1")),
            page("https://example.com/bad", Some("22")),
        ])]);
        let store = RecordingStore::failing_on("bad");

        let record = run_with(&service, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;
        let CompletionRecord::Completed(done) = record else {
            panic!("expected a completed record");
        };
        assert_eq!((done.uploaded_files, done.failed_uploads), (1, 1));
        assert_eq!(done.upload_size_bytes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_text_job_uploads_one_file() {
        let scratch = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![synthesis_step(JobStatus::Completed, Some("# Example"))]);
        let store = RecordingStore::default();

        let record = run_with(
            &service,
            &store,
            &settings(scratch.path()),
            &job(JobKind::FullTextSynthesis),
        )
        .await;
        let CompletionRecord::Completed(done) = record else {
            panic!("expected a completed record");
        };
        assert_eq!(done.file_count, 1);
        assert_eq!(
            done.counters,
            KindCounters::FullTextSynthesis {
                processed_urls_count: 2
            }
        );
        assert_eq!(
            store.body("bucket/out/job-1/llmfull.txt").as_deref(),
            Some("# Example".as_bytes())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_skips_materialize_and_upload() {
        let scratch = tempfile::tempdir().unwrap();
        let service = ScriptedService::new(vec![crawl_step(JobStatus::Running, 1, 9)]);
        let store = RecordingStore::default();

        let record = run_with(&service, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;

        match &record {
            CompletionRecord::TimedOut { id, error, elapsed_time } => {
                assert_eq!(id, "job-1");
                assert_eq!(error, "Timeout waiting for job job-1 to complete");
                assert!(*elapsed_time > 25.0);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(store.attempts(), 0);
        assert_eq!(service.collections(), 0);
        assert!(is_empty_dir(scratch.path()));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_become_failed_records() {
        let scratch = tempfile::tempdir().unwrap();
        let store = RecordingStore::default();

        let flaky = ScriptedService::new(vec![Step::Fail("HTTP 502 from upstream".into())]);
        let record = run_with(&flaky, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;
        assert_eq!(record.status(), JobStatus::Failed);
        assert!(record.error().unwrap().contains("HTTP 502"));

        let cancelled = ScriptedService::new(vec![crawl_step(JobStatus::Failed, 0, 5)]);
        let record = run_with(&cancelled, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;
        assert_eq!(record.status(), JobStatus::Failed);
        assert_eq!(record.id(), "job-1");

        let anonymous = ScriptedService::new(vec![]).without_credential();
        let record = run_with(&anonymous, &store, &settings(scratch.path()), &job(JobKind::HtmlCrawl)).await;
        assert!(record.error().unwrap().contains("FIRECRAWL_API_KEY"));
        assert_eq!(anonymous.status_checks(), 0);

        assert_eq!(store.attempts(), 0);
        assert!(is_empty_dir(scratch.path()));
    }
}
