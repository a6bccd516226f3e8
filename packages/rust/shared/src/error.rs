//! Error types for crawlrelay.
//!
//! Library crates use [`RelayError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all crawlrelay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed storage target. Detected before any remote call.
    #[error("invalid storage locator: {message}")]
    InvalidLocator { message: String },

    /// A required secret is absent at the time of a remote call.
    #[error("missing credential: set the {var} environment variable")]
    MissingCredential { var: String },

    /// Caller passed a job kind that is not recognized.
    #[error("unknown job kind '{0}': expected 'html-crawl' or 'full-text-synthesis'")]
    UnknownJobKind(String),

    /// The remote service accepted the request but returned no job id.
    #[error("remote service did not return a job id: {payload}")]
    LaunchRejected { payload: String },

    /// Transport, HTTP, or response-shape failure from a remote call.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// Job journal (libSQL) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Operation not offered for this job kind or backend.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No job with the given id is known locally.
    #[error("job not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Create an invalid-locator error from any displayable message.
    pub fn invalid_locator(msg: impl Into<String>) -> Self {
        Self::InvalidLocator {
            message: msg.into(),
        }
    }

    /// Create a missing-credential error naming the env var that was checked.
    pub fn missing_credential(var: impl Into<String>) -> Self {
        Self::MissingCredential { var: var.into() }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for faults caused by the caller rather than a remote or local failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLocator { .. } | Self::UnknownJobKind(_) | Self::Unsupported(_)
        )
    }
}
