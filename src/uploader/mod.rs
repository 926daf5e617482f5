//! Chunked upload pipeline: hash, negotiate, transfer slices, poll for assembly

mod coordinator;
pub mod error;
pub mod hash;
pub mod poller;
pub mod progress;
pub mod slice;
pub mod slicer;

pub use coordinator::{UploadRequest, Uploader};
pub use error::{UploadError, UploadResult};
pub use poller::CompletionPoller;
pub use progress::{FnProgress, NoOpProgress, ProgressCallback, ProgressUpdate};
pub use slice::{RetryPolicy, ServerPicker, SliceUploader};
pub use slicer::SliceDescriptor;

use serde::Deserialize;
use std::time::Duration;

/// How an upload server is chosen from the session's list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerSelection {
    /// Uniformly random per slice attempt
    #[default]
    Random,
    /// Rotate through the list in order
    RoundRobin,
}

/// Uploader tuning
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Slices in flight at once
    pub slice_concurrency: usize,
    /// Retries per slice after the first attempt
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Completion polls before giving up
    pub poll_max_attempts: u32,
    pub poll_interval: Duration,
    pub server_selection: ServerSelection,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            slice_concurrency: 1,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(10),
            poll_max_attempts: 60,
            poll_interval: Duration::from_secs(1),
            server_selection: ServerSelection::Random,
        }
    }
}

impl UploaderConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
        }
    }

    pub fn validate(&self) -> UploadResult<()> {
        if self.slice_concurrency == 0 {
            return Err(UploadError::InvalidArgument(
                "slice concurrency must be at least 1".to_string(),
            ));
        }
        if self.poll_max_attempts == 0 {
            return Err(UploadError::InvalidArgument(
                "completion poll attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
