//! Scripted doubles for the remote service and the object store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crawlrelay_firecrawl::{JobService, StartedJob};
use crawlrelay_objectstore::ObjectStore;
use crawlrelay_shared::{
    CrawlSnapshot, JobKind, JobSnapshot, JobStatus, LaunchParams, PageResult, RelayError, Result,
    SynthesisSnapshot,
};

/// One scripted answer to a status call.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Snapshot(JobSnapshot),
    Fail(String),
}

pub(crate) fn crawl_step(status: JobStatus, completed: u64, total: u64) -> Step {
    Step::Snapshot(JobSnapshot::HtmlCrawl(CrawlSnapshot {
        status,
        completed,
        total,
        pages: Vec::new(),
        next: None,
    }))
}

pub(crate) fn completed_crawl(pages: Vec<PageResult>) -> Step {
    let n = pages.len() as u64;
    Step::Snapshot(JobSnapshot::HtmlCrawl(CrawlSnapshot {
        status: JobStatus::Completed,
        completed: n,
        total: n,
        pages,
        next: None,
    }))
}

pub(crate) fn synthesis_step(status: JobStatus, text: Option<&str>) -> Step {
    Step::Snapshot(JobSnapshot::FullTextSynthesis(SynthesisSnapshot {
        status,
        text: text.map(str::to_string),
        processed_urls: vec!["https://example.com".into(), "https://example.com/a".into()],
    }))
}

pub(crate) fn page(url: &str, html: Option<&str>) -> PageResult {
    PageResult {
        source_url: url.to_string(),
        content: html.map(str::to_string),
    }
}

/// Replays `steps` in order; the last step repeats forever.
pub(crate) struct ScriptedService {
    credential: bool,
    start_id: Option<String>,
    steps: Vec<Step>,
    pub start_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub collect_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            credential: true,
            start_id: Some("job-1".into()),
            steps,
            start_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            collect_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    pub fn with_start_id(mut self, id: Option<&str>) -> Self {
        self.start_id = id.map(str::to_string);
        self
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn collections(&self) -> usize {
        self.collect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobService for ScriptedService {
    fn check_credential(&self) -> Result<()> {
        if self.credential {
            Ok(())
        } else {
            Err(RelayError::missing_credential("FIRECRAWL_API_KEY"))
        }
    }

    async fn start_job(&self, source_url: &str, params: &LaunchParams) -> Result<StartedJob> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let raw = match &self.start_id {
            Some(id) => json!({"success": true, "id": id, "url": source_url}),
            None => json!({"success": false, "error": format!("rejected {}", params.kind())}),
        };
        Ok(StartedJob {
            id: self.start_id.clone(),
            raw,
        })
    }

    async fn job_status(&self, _id: &str, _kind: JobKind) -> Result<JobSnapshot> {
        let n = self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .get(n)
            .or(self.steps.last())
            .cloned()
            .unwrap_or_else(|| crawl_step(JobStatus::Pending, 0, 0));
        match step {
            Step::Snapshot(snapshot) => Ok(snapshot),
            Step::Fail(msg) => Err(RelayError::Remote(msg)),
        }
    }

    async fn collect_results(&self, mut snapshot: JobSnapshot) -> Result<JobSnapshot> {
        self.collect_calls.fetch_add(1, Ordering::SeqCst);
        if let JobSnapshot::HtmlCrawl(crawl) = &mut snapshot {
            crawl.next = None;
        }
        Ok(snapshot)
    }

    async fn cancel_job(&self, _id: &str, kind: JobKind) -> Result<JobStatus> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        match kind {
            JobKind::HtmlCrawl => Ok(JobStatus::Failed),
            JobKind::FullTextSynthesis => Err(RelayError::Unsupported("no cancel".into())),
        }
    }
}

/// Keeps uploaded bodies in memory; fails keys containing `fail_marker`.
#[derive(Default)]
pub(crate) struct RecordingStore {
    fail_marker: Option<String>,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub attempts: AtomicUsize,
}

impl RecordingStore {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn backend(&self) -> &str {
        "recording"
    }

    async fn upload_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_marker {
            if key.contains(marker.as_str()) {
                return Err(RelayError::Remote(format!("refused {key}")));
            }
        }
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| RelayError::io(local_path, e))?;
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{bucket}/{key}"), body);
        Ok(())
    }
}
