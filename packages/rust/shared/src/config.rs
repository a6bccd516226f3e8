//! Application configuration for crawlrelay.
//!
//! User config lives at `~/.crawlrelay/crawlrelay.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "crawlrelay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".crawlrelay";

/// Default job journal file name inside the config directory.
const JOURNAL_FILE_NAME: &str = "jobs.db";

// ---------------------------------------------------------------------------
// Config structs (matching crawlrelay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote crawl service settings.
    #[serde(default)]
    pub firecrawl: FirecrawlConfig,

    /// Completion polling.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Scratch file naming and locator rules.
    #[serde(default)]
    pub output: OutputConfig,

    /// Upload backend.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Launch defaults and journal location.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

impl AppConfig {
    /// The locator scheme in effect: configured, else the backend's.
    pub fn locator_scheme(&self) -> &str {
        self.output
            .locator_scheme
            .as_deref()
            .unwrap_or(self.object_store.backend.default_scheme())
    }

    /// Reject combinations that would silently send uploads elsewhere than
    /// their locators say.
    pub fn validate(&self) -> Result<()> {
        let scheme = self.locator_scheme();
        if scheme.is_empty() {
            return Err(RelayError::config("output.locator_scheme must not be empty"));
        }
        if scheme == "s3" && self.object_store.backend != ObjectStoreBackend::S3 {
            return Err(RelayError::config(
                "s3:// locators need object_store.backend = \"s3\"",
            ));
        }
        Ok(())
    }
}

/// `[firecrawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirecrawlConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API root, without the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.firecrawl.dev".into()
}
fn default_request_timeout() -> u64 {
    60
}

/// `[polling]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between status checks.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Seconds before a job is reported as timed out.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_interval() -> u64 {
    30
}
fn default_timeout() -> u64 {
    3600
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Scheme every storage locator must carry (`<scheme>://bucket/prefix`).
    /// Unset means the backend's own scheme (`file` or `s3`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator_scheme: Option<String>,

    /// Sanitized page names longer than this fall back to `<domain>_<md5>.html`.
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,

    /// File name for full-text synthesis output.
    #[serde(default = "default_full_text_file_name")]
    pub full_text_file_name: String,

    /// Parent directory for per-job scratch directories (system temp dir if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            locator_scheme: None,
            max_filename_len: default_max_filename_len(),
            full_text_file_name: default_full_text_file_name(),
            scratch_dir: None,
        }
    }
}

fn default_max_filename_len() -> usize {
    200
}
fn default_full_text_file_name() -> String {
    "llmfull.txt".into()
}

/// Which object store implementation receives uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreBackend {
    /// Mirror objects under a local directory (`<local_root>/<bucket>/<key>`).
    #[default]
    Local,
    /// Amazon S3 or an S3-compatible endpoint (requires the `s3` feature).
    S3,
}

impl ObjectStoreBackend {
    /// Locator scheme used when `[output] locator_scheme` is unset.
    pub fn default_scheme(self) -> &'static str {
        match self {
            Self::Local => "file",
            Self::S3 => "s3",
        }
    }
}

/// `[object_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub backend: ObjectStoreBackend,

    /// Root directory for the local backend.
    #[serde(default = "default_local_root")]
    pub local_root: String,

    /// AWS region for the S3 backend.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Env var holding the access key id.
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    /// Env var holding the secret access key.
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::default(),
            local_root: default_local_root(),
            region: default_region(),
            endpoint: None,
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

fn default_local_root() -> String {
    "~/crawlrelay-objects".into()
}
fn default_region() -> String {
    "us-east-1".into()
}
fn default_access_key_env() -> String {
    "AWS_KEY".into()
}
fn default_secret_key_env() -> String {
    "AWS_SECRET".into()
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum pages per html crawl.
    #[serde(default = "default_crawl_limit")]
    pub crawl_limit: u32,

    /// Maximum URLs a full-text synthesis job may process.
    #[serde(default = "default_max_urls")]
    pub max_urls: u32,

    /// Job journal path (defaults to `~/.crawlrelay/jobs.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            crawl_limit: default_crawl_limit(),
            max_urls: default_max_urls(),
            database: None,
        }
    }
}

fn default_crawl_limit() -> u32 {
    100
}
fn default_max_urls() -> u32 {
    10
}

// ---------------------------------------------------------------------------
// Relay settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime orchestration settings, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Pause between status checks.
    pub poll_interval: Duration,
    /// Wall-clock bound on polling.
    pub poll_timeout: Duration,
    /// Scheme required on storage locators.
    pub locator_scheme: String,
    /// Threshold for the hashed page-name fallback.
    pub max_filename_len: usize,
    /// Fixed name of the full-text output file.
    pub full_text_file_name: String,
    /// Parent for scratch directories; `None` uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RelaySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.polling.interval_secs),
            poll_timeout: Duration::from_secs(config.polling.timeout_secs),
            locator_scheme: config.locator_scheme().to_string(),
            max_filename_len: config.output.max_filename_len,
            full_text_file_name: config.output.full_text_file_name.clone(),
            scratch_dir: config.output.scratch_dir.as_deref().map(expand_home),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.crawlrelay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RelayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.crawlrelay/crawlrelay.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RelayError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| RelayError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RelayError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| RelayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RelayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the job journal path: configured value, else `~/.crawlrelay/jobs.db`.
pub fn journal_path(config: &AppConfig) -> Result<PathBuf> {
    match config.defaults.database.as_deref() {
        Some(path) => Ok(expand_home(path)),
        None => Ok(config_dir()?.join(JOURNAL_FILE_NAME)),
    }
}

/// Read a non-empty secret from the named env var.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(RelayError::missing_credential(var_name)),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
