use crate::uploader::UploaderConfig;
use crate::uploader::error::{UploadError, UploadResult};
use crate::uploader::hash::{FileDigest, hash_file};
use crate::uploader::poller::CompletionPoller;
use crate::uploader::progress::{NoOpProgress, ProgressCallback, ProgressUpdate};
use crate::uploader::slice::{ServerPicker, SliceUploader, read_slice};
use crate::uploader::slicer::{self, SliceDescriptor};
use futures::{StreamExt, stream};
use pan123_api::api::UploadApi;
use pan123_api::models::upload::{CreateFileRequest, DuplicatePolicy, UploadSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What to upload and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    /// Destination name relative to `parent_id`; may contain `/` to create directories
    pub remote_path: String,
    pub parent_id: u64,
    /// Replace an existing file instead of keeping both
    pub overwrite: bool,
}

impl UploadRequest {
    pub fn new(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            parent_id: 0,
            overwrite: false,
        }
    }

    pub fn with_parent_id(mut self, parent_id: u64) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Remote path with Windows separators turned into `/`
    pub fn normalized_remote_path(&self) -> String {
        self.remote_path.replace('\\', "/")
    }

    /// Whether the server must create intermediate directories
    pub fn contains_dir(&self) -> bool {
        self.normalized_remote_path().contains('/')
    }
}

/// Runs one upload end to end: hash, negotiate, dedup check, slices, completion poll
pub struct Uploader<A> {
    api: Arc<A>,
    config: UploaderConfig,
}

impl<A: UploadApi> Uploader<A> {
    pub fn new(api: Arc<A>, config: UploaderConfig) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self { api, config })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Upload a file and return its remote file id
    pub async fn upload(&self, request: &UploadRequest) -> UploadResult<u64> {
        self.upload_with(request, &NoOpProgress, &CancellationToken::new())
            .await
    }

    /// Upload with progress reporting and cancellation
    pub async fn upload_with<P: ProgressCallback>(
        &self,
        request: &UploadRequest,
        progress: &P,
        cancel_token: &CancellationToken,
    ) -> UploadResult<u64> {
        let remote_path = request.normalized_remote_path();
        if remote_path.trim_matches('/').is_empty() {
            return Err(UploadError::InvalidArgument(
                "remote path must not be empty".to_string(),
            ));
        }

        info!(
            target: "uploader",
            local_path = %request.local_path.display(),
            remote_path = %remote_path,
            parent_id = request.parent_id,
            overwrite = request.overwrite,
            "Starting upload"
        );

        let digest = hash_file(&request.local_path).await?;
        debug!(
            target: "uploader",
            md5 = %digest.md5,
            size = digest.size,
            "Local file hashed"
        );

        if cancel_token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let session = self.negotiate(request, &remote_path, digest).await?;

        if let Some(file_id) = session.reuse_file_id {
            info!(
                target: "uploader",
                file_id,
                "Server already has identical content, skipping transfer"
            );
            progress.on_progress(ProgressUpdate::new(
                session.total_size,
                session.total_size,
                None,
                0,
                0,
            ));
            return Ok(file_id);
        }

        self.transfer_slices(&request.local_path, &session, progress, cancel_token)
            .await?;

        let poller = CompletionPoller::new(
            self.api.clone(),
            self.config.poll_max_attempts,
            self.config.poll_interval,
        );
        let file_id = poller
            .wait_for_completion(&session.session_id, cancel_token)
            .await?;

        info!(target: "uploader", file_id, "Upload finished");
        Ok(file_id)
    }

    async fn negotiate(
        &self,
        request: &UploadRequest,
        remote_path: &str,
        digest: FileDigest,
    ) -> UploadResult<UploadSession> {
        let create = CreateFileRequest {
            parent_file_id: request.parent_id,
            filename: remote_path.to_string(),
            etag: digest.md5.clone(),
            size: digest.size,
            duplicate: DuplicatePolicy::from_overwrite(request.overwrite),
            contain_dir: remote_path.contains('/'),
        };

        let data = self.api.create_file(&create).await?;
        let session = data.into_session(digest.size, digest.md5)?;

        debug!(
            target: "uploader",
            session_id = %session.session_id,
            slice_size = session.slice_size,
            servers = session.servers.len(),
            reuse = session.is_reused(),
            "Upload session negotiated"
        );
        Ok(session)
    }

    /// Transmit every non-empty slice through a bounded pool.
    ///
    /// The first failure drops all in-flight transfers.
    async fn transfer_slices<P: ProgressCallback>(
        &self,
        local_path: &Path,
        session: &UploadSession,
        progress: &P,
        cancel_token: &CancellationToken,
    ) -> UploadResult<()> {
        let slices = slicer::plan(session.total_size, session.slice_size)?;
        let total_slices = slices.len();

        // Zero-length slices carry nothing and are never transmitted
        let pending: Vec<SliceDescriptor> = slices.into_iter().filter(|s| !s.is_empty()).collect();
        let mut completed = total_slices - pending.len();
        if pending.is_empty() {
            debug!(target: "uploader", "No slice carries data, nothing to transmit");
            return Ok(());
        }

        info!(
            target: "uploader",
            slices = pending.len(),
            concurrency = self.config.slice_concurrency,
            "Uploading slices"
        );

        let picker = ServerPicker::new(session.servers.clone(), self.config.server_selection)?;
        let uploader = SliceUploader::new(self.api.clone(), picker, self.config.retry_policy());
        let uploader = &uploader;
        let session_id = session.session_id.as_str();

        let mut transfers = stream::iter(pending)
            .map(move |slice| async move {
                if cancel_token.is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                let data = read_slice(local_path, &slice).await?;
                uploader
                    .upload_with_retry(session_id, slice, data, cancel_token)
                    .await
            })
            .buffer_unordered(self.config.slice_concurrency);

        let mut uploaded = 0u64;
        while let Some(result) = transfers.next().await {
            let slice = result?;
            uploaded += slice.len();
            completed += 1;
            progress.on_progress(ProgressUpdate::new(
                session.total_size,
                uploaded,
                Some(slice.index),
                completed,
                total_slices,
            ));
        }

        Ok(())
    }
}
