//! Completion polling

use crate::uploader::error::{UploadError, UploadResult};
use pan123_api::api::UploadApi;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls the server until it reports the session as assembled
pub struct CompletionPoller<A> {
    api: Arc<A>,
    max_attempts: u32,
    interval: Duration,
}

impl<A: UploadApi> CompletionPoller<A> {
    pub fn new(api: Arc<A>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            api,
            max_attempts,
            interval,
        }
    }

    /// Wait until the session is assembled and return the resulting file id.
    ///
    /// A failed poll counts as "not yet complete". After `max_attempts`
    /// unsuccessful polls this fails with [`UploadError::Timeout`].
    pub async fn wait_for_completion(
        &self,
        session_id: &str,
        cancel_token: &CancellationToken,
    ) -> UploadResult<u64> {
        for attempt in 1..=self.max_attempts {
            if cancel_token.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            match self.api.upload_complete(session_id).await {
                Ok(result) if result.completed => {
                    info!(
                        target: "uploader::poll",
                        session_id,
                        file_id = result.file_id,
                        attempt,
                        "Upload assembled"
                    );
                    return Ok(result.file_id);
                }
                Ok(_) => {
                    debug!(
                        target: "uploader::poll",
                        session_id,
                        attempt,
                        "Upload not assembled yet"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "uploader::poll",
                        session_id,
                        attempt,
                        error = %e,
                        "Completion poll failed, treating as not complete"
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = cancel_token.cancelled() => {
                        return Err(UploadError::Cancelled);
                    }
                }
            }
        }

        Err(UploadError::Timeout {
            session_id: session_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}
