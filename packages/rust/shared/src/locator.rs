//! Object storage locators (`scheme://bucket/prefix/`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

const SCHEME_SEPARATOR: &str = "://";

/// Validate a caller-supplied locator against `scheme` and normalize it to end
/// with exactly one added `/` when the separator is missing.
///
/// Validating an already-normalized locator returns it unchanged.
pub fn validate_locator(raw: &str, scheme: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(RelayError::invalid_locator("storage locator is required"));
    }

    let required = format!("{scheme}{SCHEME_SEPARATOR}");
    let Some(rest) = raw.strip_prefix(&required) else {
        return Err(RelayError::invalid_locator(format!(
            "storage locator must start with '{required}'"
        )));
    };

    if rest.split('/').next().unwrap_or("").is_empty() {
        return Err(RelayError::invalid_locator(format!(
            "storage locator '{raw}' has no bucket"
        )));
    }

    let mut normalized = raw.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// A validated, normalized storage address. Always ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageLocator {
    uri: String,
    /// Byte offset where the bucket starts (just past `://`).
    bucket_start: usize,
    /// Byte offset of the `/` that ends the bucket.
    bucket_end: usize,
}

impl StorageLocator {
    /// Validate `raw` against the required scheme.
    pub fn parse(raw: &str, scheme: &str) -> Result<Self> {
        let uri = validate_locator(raw, scheme)?;
        Ok(Self::from_normalized(uri, scheme.len() + SCHEME_SEPARATOR.len()))
    }

    fn from_normalized(uri: String, bucket_start: usize) -> Self {
        let bucket_end = uri[bucket_start..]
            .find('/')
            .map(|i| bucket_start + i)
            .unwrap_or(uri.len());
        Self {
            uri,
            bucket_start,
            bucket_end,
        }
    }

    /// The full locator string, trailing `/` included.
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    pub fn scheme(&self) -> &str {
        &self.uri[..self.bucket_start - SCHEME_SEPARATOR.len()]
    }

    pub fn bucket(&self) -> &str {
        &self.uri[self.bucket_start..self.bucket_end]
    }

    /// Key prefix inside the bucket; empty or ending with `/`.
    pub fn prefix(&self) -> &str {
        self.uri.get(self.bucket_end + 1..).unwrap_or("")
    }

    /// Per-job destination: `<locator><job_id>/`.
    pub fn for_job(&self, job_id: &str) -> Self {
        Self::from_normalized(format!("{}{job_id}/", self.uri), self.bucket_start)
    }
}

impl fmt::Display for StorageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Parses a locator of any scheme (used when reading journal rows back).
impl FromStr for StorageLocator {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let scheme = s
            .split_once(SCHEME_SEPARATOR)
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty())
            .ok_or_else(|| {
                RelayError::invalid_locator(format!("'{s}' is not a scheme://bucket locator"))
            })?;
        Self::parse(s, scheme)
    }
}

impl TryFrom<String> for StorageLocator {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StorageLocator> for String {
    fn from(locator: StorageLocator) -> Self {
        locator.uri
    }
}
