//! Job relay orchestration for crawlrelay.
//!
//! This crate ties the remote job service, the object store, and the job
//! journal together: launch a job, poll it to completion in the background,
//! write its results to a scratch directory, upload them, and record the
//! outcome.

pub mod materialize;
pub mod pipeline;
pub mod poll;
pub mod probe;
pub mod progress;
pub mod relay;

#[cfg(test)]
mod testing;

pub use materialize::{NamingPolicy, materialize, page_file_name};
pub use pipeline::{PipelineContext, complete_job};
pub use poll::{PollOutcome, PollSettings, poll_until_complete};
pub use probe::{check_status, status_report};
pub use progress::{ProgressReporter, SilentProgress};
pub use relay::{CompletionHandle, LaunchRequest, Launched, Relay};
