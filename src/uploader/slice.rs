//! Slice transfer with bounded retry

use crate::uploader::ServerSelection;
use crate::uploader::error::{UploadError, UploadResult};
use crate::uploader::hash::md5_hex;
use crate::uploader::slicer::SliceDescriptor;
use bytes::Bytes;
use pan123_api::ApiError;
use pan123_api::api::UploadApi;
use pan123_api::models::upload::SliceUpload;
use rand::seq::SliceRandom;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Retry settings for a single slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0 for the first retry):
    /// `base * 2^retry`, capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let delay_ms = base.saturating_mul(1 << retry.min(10));
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Chooses an upload server for each slice attempt
#[derive(Debug)]
pub struct ServerPicker {
    servers: Vec<String>,
    selection: ServerSelection,
    next: AtomicUsize,
}

impl ServerPicker {
    pub fn new(servers: Vec<String>, selection: ServerSelection) -> UploadResult<Self> {
        if servers.is_empty() {
            return Err(UploadError::InvalidArgument(
                "upload session lists no servers".to_string(),
            ));
        }
        Ok(Self {
            servers,
            selection,
            next: AtomicUsize::new(0),
        })
    }

    pub fn pick(&self) -> &str {
        match self.selection {
            ServerSelection::Random => self
                .servers
                .choose(&mut rand::thread_rng())
                .map(String::as_str)
                .unwrap_or(&self.servers[0]),
            ServerSelection::RoundRobin => {
                let i = self.next.fetch_add(1, Ordering::Relaxed) % self.servers.len();
                &self.servers[i]
            }
        }
    }
}

/// Read the bytes of one slice from the source file
pub async fn read_slice(path: &Path, slice: &SliceDescriptor) -> UploadResult<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(slice.start)).await?;

    let mut buf = vec![0u8; slice.len() as usize];
    file.read_exact(&mut buf).await.map_err(|e| {
        UploadError::FileReadError(format!(
            "slice {} ({}..{}) of {}: {}",
            slice.index,
            slice.start,
            slice.end,
            path.display(),
            e
        ))
    })?;

    Ok(Bytes::from(buf))
}

/// Uploads slices of one session
pub struct SliceUploader<A> {
    api: Arc<A>,
    servers: ServerPicker,
    retry: RetryPolicy,
}

impl<A: UploadApi> SliceUploader<A> {
    pub fn new(api: Arc<A>, servers: ServerPicker, retry: RetryPolicy) -> Self {
        Self {
            api,
            servers,
            retry,
        }
    }

    /// Send one slice to `server` in a single attempt.
    ///
    /// The hash is computed here from `data`, never taken from the caller.
    pub async fn upload(
        &self,
        server: &str,
        session_id: &str,
        slice: &SliceDescriptor,
        data: Bytes,
    ) -> UploadResult<String> {
        self.attempt(server, session_id, slice, data)
            .await
            .map_err(UploadError::from)
    }

    /// Send one slice, retrying transient failures with exponential backoff.
    ///
    /// Returns the descriptor with its content hash filled in.
    pub async fn upload_with_retry(
        &self,
        session_id: &str,
        mut slice: SliceDescriptor,
        data: Bytes,
        cancel_token: &CancellationToken,
    ) -> UploadResult<SliceDescriptor> {
        if data.len() as u64 != slice.len() {
            return Err(UploadError::InvalidArgument(format!(
                "slice {} expects {} bytes, got {}",
                slice.index,
                slice.len(),
                data.len()
            )));
        }

        let mut attempt = 0;
        loop {
            if cancel_token.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let server = self.servers.pick();
            match self.attempt(server, session_id, &slice, data.clone()).await {
                Ok(hash) => {
                    debug!(
                        target: "uploader::slice",
                        slice = slice.index,
                        server,
                        attempt,
                        "Slice uploaded"
                    );
                    slice.content_hash = Some(hash);
                    return Ok(slice);
                }
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.retry.max_retries {
                        error!(
                            target: "uploader::slice",
                            slice = slice.index,
                            server,
                            error = %e,
                            attempt,
                            "Slice upload failed"
                        );
                        return Err(UploadError::slice_failed(slice.index, e.into()));
                    }
                    warn!(
                        target: "uploader::slice",
                        slice = slice.index,
                        server,
                        error = %e,
                        attempt,
                        "Slice upload failed, will retry"
                    );
                }
            }

            let delay = self.retry.delay_for(attempt);
            attempt += 1;
            debug!(
                target: "uploader::slice",
                slice = slice.index,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying slice upload"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_token.cancelled() => {
                    return Err(UploadError::Cancelled);
                }
            }
        }
    }

    async fn attempt(
        &self,
        server: &str,
        session_id: &str,
        slice: &SliceDescriptor,
        data: Bytes,
    ) -> Result<String, ApiError> {
        let slice_md5 = md5_hex(&data);
        self.api
            .upload_slice(SliceUpload {
                server: server.to_string(),
                session_id: session_id.to_string(),
                slice_no: slice.index,
                slice_md5: slice_md5.clone(),
                data,
            })
            .await?;
        Ok(slice_md5)
    }
}
