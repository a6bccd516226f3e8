//! CLI command definitions, routing, and tracing setup.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crawlrelay_core::{LaunchRequest, ProgressReporter, Relay, SilentProgress};
use crawlrelay_firecrawl::FirecrawlClient;
use crawlrelay_objectstore::build_object_store;
use crawlrelay_shared::{
    AppConfig, CompletionRecord, JobStatus, RelaySettings, init_config, journal_path, load_config,
    load_config_from,
};
use crawlrelay_storage::JobStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// crawlrelay: run remote crawl jobs and ship their results to object storage.
#[derive(Parser)]
#[command(
    name = "crawlrelay",
    version,
    about = "Launch Firecrawl jobs and relay their results to object storage.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.crawlrelay/crawlrelay.toml).
    #[arg(long, global = true, env = "CRAWLRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Job journal database (overrides `defaults.database`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl a site and upload each page's HTML.
    Crawl {
        /// Site to crawl.
        url: String,

        /// Storage locator, e.g. file://bucket/prefix (s3://bucket/prefix with the S3 backend).
        #[arg(short, long)]
        dest: String,

        /// Maximum pages to crawl (defaults to `defaults.crawl_limit`).
        #[arg(short, long)]
        limit: Option<u32>,

        /// Print the launch reply and exit; finish later with `resume`.
        #[arg(long)]
        detach: bool,
    },

    /// Generate a site's full LLM text and upload it as one file.
    Llmstxt {
        /// Site to read.
        url: String,

        /// Storage locator, e.g. file://bucket/prefix (s3://bucket/prefix with the S3 backend).
        #[arg(short, long)]
        dest: String,

        /// Maximum URLs to process (defaults to `defaults.max_urls`).
        #[arg(long)]
        max_urls: Option<u32>,

        /// Print the launch reply and exit; finish later with `resume`.
        #[arg(long)]
        detach: bool,
    },

    /// Query the remote status of a job.
    Status {
        /// Job id.
        id: String,

        /// Job kind: html-crawl or full-text-synthesis.
        #[arg(short, long, default_value = "html-crawl")]
        kind: String,
    },

    /// Show the completion record of a journaled job.
    Completion {
        /// Job id.
        id: String,
    },

    /// List journaled jobs.
    Jobs,

    /// Finish every journaled job that has no completion record yet.
    Resume,

    /// Cancel a remote crawl.
    Cancel {
        /// Job id.
        id: String,

        /// Job kind (only html-crawl jobs can be cancelled).
        #[arg(short, long, default_value = "html-crawl")]
        kind: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout is JSON only.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "crawlrelay=info",
        1 => "crawlrelay=debug",
        _ => "crawlrelay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let paths = Paths {
        config: cli.config,
        db: cli.db,
    };

    match cli.command {
        Command::Crawl {
            url,
            dest,
            limit,
            detach,
        } => {
            let config = paths.load()?;
            let limit = limit.unwrap_or(config.defaults.crawl_limit);
            let request = LaunchRequest::html_crawl(parse_source(&url)?, dest, limit);
            cmd_launch(&paths, config, request, detach).await
        }
        Command::Llmstxt {
            url,
            dest,
            max_urls,
            detach,
        } => {
            let config = paths.load()?;
            let max_urls = max_urls.unwrap_or(config.defaults.max_urls);
            let request = LaunchRequest::full_text(parse_source(&url)?, dest, max_urls);
            cmd_launch(&paths, config, request, detach).await
        }
        Command::Status { id, kind } => cmd_status(&paths, &id, &kind).await,
        Command::Completion { id } => cmd_completion(&paths, &id).await,
        Command::Jobs => cmd_jobs(&paths).await,
        Command::Resume => cmd_resume(&paths).await,
        Command::Cancel { id, kind } => cmd_cancel(&paths, &id, &kind).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&paths).await,
        },
    }
}

/// Config and journal locations from global flags.
struct Paths {
    config: Option<PathBuf>,
    db: Option<PathBuf>,
}

impl Paths {
    fn load(&self) -> Result<AppConfig> {
        let config = match &self.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(config)
    }

    fn journal(&self, config: &AppConfig) -> Result<PathBuf> {
        match &self.db {
            Some(path) => Ok(path.clone()),
            None => Ok(journal_path(config)?),
        }
    }
}

/// Wire the relay from config: Firecrawl client, object store, journal.
async fn build_relay(
    paths: &Paths,
    config: &AppConfig,
    progress: Arc<dyn ProgressReporter>,
) -> Result<Relay> {
    let service = FirecrawlClient::new(&config.firecrawl)?;
    let store = build_object_store(&config.object_store).await?;
    let journal = open_journal(&paths.journal(config)?).await?;

    Ok(Relay::new(Arc::new(service), store, RelaySettings::from(config))
        .with_journal(Arc::new(journal))
        .with_progress(progress))
}

async fn open_journal(path: &Path) -> Result<JobStore> {
    JobStore::open(path)
        .await
        .map_err(|e| eyre!("cannot open job journal at {}: {e}", path.display()))
}

/// Accept only absolute http(s) URLs.
fn parse_source(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(eyre!("unsupported URL scheme '{other}': expected http or https")),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Tool-level failures are reported as `{"error": ...}` with a zero exit code.
fn print_error(error: impl Display) -> Result<()> {
    print_json(&json!({ "error": error.to_string() }))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_launch(
    paths: &Paths,
    config: AppConfig,
    request: LaunchRequest,
    detach: bool,
) -> Result<()> {
    let progress = if detach {
        None
    } else {
        Some(Arc::new(CliProgress::new()))
    };
    let reporter: Arc<dyn ProgressReporter> = match &progress {
        Some(p) => p.clone(),
        None => Arc::new(SilentProgress),
    };
    let relay = build_relay(paths, &config, reporter).await?;

    info!(
        url = %request.source_url,
        dest = %request.locator,
        kind = %request.params.kind(),
        "launching job"
    );

    let launched = match relay.launch(request).await {
        Ok(launched) => launched,
        Err(e) => {
            if let Some(p) = &progress {
                p.finish();
            }
            return print_error(e);
        }
    };
    print_json(&launched.ack)?;

    if detach {
        if let Err(e) = relay.detach(launched.handle).await {
            warn!(job_id = %launched.ack.id, error = %e, "could not release job lease");
        }
        info!(
            job_id = %launched.ack.id,
            "detached; run `crawlrelay resume` to finish the upload"
        );
        return Ok(());
    }

    let record = launched.handle.wait().await;
    if let Some(p) = &progress {
        p.finish();
    }
    print_json(&record)
}

async fn cmd_status(paths: &Paths, id: &str, kind: &str) -> Result<()> {
    let config = paths.load()?;
    let relay = build_relay(paths, &config, Arc::new(SilentProgress)).await?;
    print_json(&relay.check_status(id, kind).await)
}

async fn cmd_completion(paths: &Paths, id: &str) -> Result<()> {
    let config = paths.load()?;
    let relay = build_relay(paths, &config, Arc::new(SilentProgress)).await?;

    match relay.completion(id).await {
        Ok(Some(record)) => print_json(&record),
        Ok(None) => {
            let status = relay
                .job(id)
                .await
                .map(|job| job.status)
                .unwrap_or(JobStatus::Pending);
            print_json(&json!({
                "id": id,
                "status": status,
                "message": "Job has not finished yet",
            }))
        }
        Err(e) => print_error(e),
    }
}

async fn cmd_jobs(paths: &Paths) -> Result<()> {
    let config = paths.load()?;
    let relay = build_relay(paths, &config, Arc::new(SilentProgress)).await?;
    match relay.list_jobs().await {
        Ok(jobs) => print_json(&jobs),
        Err(e) => print_error(e),
    }
}

async fn cmd_resume(paths: &Paths) -> Result<()> {
    let config = paths.load()?;
    let progress = Arc::new(CliProgress::new());
    let relay = build_relay(paths, &config, progress.clone()).await?;

    let handles = match relay.resume_unfinished().await {
        Ok(handles) => handles,
        Err(e) => {
            progress.finish();
            return print_error(e);
        }
    };

    let mut records: Vec<CompletionRecord> = Vec::with_capacity(handles.len());
    for handle in handles {
        records.push(handle.wait().await);
    }
    progress.finish();
    print_json(&records)
}

async fn cmd_cancel(paths: &Paths, id: &str, kind: &str) -> Result<()> {
    let config = paths.load()?;
    let relay = build_relay(paths, &config, Arc::new(SilentProgress)).await?;
    match relay.cancel(id, kind).await {
        Ok(status) => print_json(&json!({ "id": id, "status": status })),
        Err(e) => print_error(e),
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(paths: &Paths) -> Result<()> {
    let config = paths.load()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, job_id: &str, name: &str) {
        self.spinner.set_message(format!("{job_id}: {name}"));
    }

    fn polled(&self, job_id: &str, status: JobStatus, elapsed: Duration) {
        self.spinner.set_message(format!(
            "{job_id}: {status} ({:.0}s)",
            elapsed.as_secs_f64()
        ));
    }

    fn done(&self, record: &CompletionRecord) {
        self.spinner
            .set_message(format!("{}: {}", record.id(), record.status()));
    }
}
