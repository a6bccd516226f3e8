//! Shared types, error model, and configuration for crawlrelay.
//!
//! This crate is the foundation depended on by all other crawlrelay crates.
//! It provides:
//! - [`RelayError`]: the unified error type
//! - Domain types ([`Job`], [`JobKind`], [`JobStatus`], [`JobSnapshot`])
//! - Storage locators ([`StorageLocator`], [`validate_locator`])
//! - Result records ([`CompletionRecord`], [`StatusReport`], [`UploadStats`])
//! - Configuration ([`AppConfig`], [`RelaySettings`], config loading)

pub mod config;
pub mod error;
pub mod locator;
pub mod record;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FirecrawlConfig, ObjectStoreBackend, ObjectStoreConfig,
    OutputConfig, PollingConfig, RelaySettings, config_dir, config_file_path, expand_home,
    init_config, journal_path, load_config, load_config_from, resolve_secret,
};
pub use error::{RelayError, Result};
pub use locator::{StorageLocator, validate_locator};
pub use record::{CompletedJob, CompletionRecord, KindCounters, LaunchAck, StatusReport, UploadStats};
pub use types::{
    CrawlSnapshot, Job, JobKind, JobSnapshot, JobStatus, LaunchParams, PageResult,
    SynthesisSnapshot,
};
