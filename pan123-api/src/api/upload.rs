use crate::client::{Client, RequestOptions};
use crate::error::ApiResult;
use crate::models::upload::*;
use async_trait::async_trait;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;

/// Chunked upload endpoints
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Negotiate an upload session (may short-circuit via dedup)
    async fn create_file(&self, request: &CreateFileRequest) -> ApiResult<CreateFileData>;

    /// Transmit one slice to one of the session's upload servers
    async fn upload_slice(&self, slice: SliceUpload) -> ApiResult<()>;

    /// Ask whether the server has assembled the session's slices
    async fn upload_complete(&self, session_id: &str) -> ApiResult<UploadCompleteData>;
}

#[async_trait]
impl UploadApi for Client {
    async fn create_file(&self, request: &CreateFileRequest) -> ApiResult<CreateFileData> {
        self.post("/upload/v2/file/create", request, RequestOptions::new())
            .await
    }

    async fn upload_slice(&self, slice: SliceUpload) -> ApiResult<()> {
        let length = slice.data.len() as u64;
        let part = Part::stream_with_length(Body::from(slice.data), length)
            .file_name(format!("slice-{}", slice.slice_no))
            .mime_str("application/octet-stream")?;

        let form = Form::new()
            .text("preuploadID", slice.session_id)
            .text("sliceNo", slice.slice_no.to_string())
            .text("sliceMD5", slice.slice_md5)
            .part("slice", part);

        self.post_multipart(
            "/upload/v2/file/slice",
            form,
            RequestOptions::new()
                .with_base_url(slice.server)
                .with_timeout(self.config().slice_timeout),
        )
        .await
    }

    async fn upload_complete(&self, session_id: &str) -> ApiResult<UploadCompleteData> {
        let request = UploadCompleteRequest {
            preupload_id: session_id.to_string(),
        };
        self.post("/upload/v2/file/upload_complete", &request, RequestOptions::new())
            .await
    }
}

#[async_trait]
impl<T: UploadApi + ?Sized> UploadApi for Arc<T> {
    async fn create_file(&self, request: &CreateFileRequest) -> ApiResult<CreateFileData> {
        (**self).create_file(request).await
    }

    async fn upload_slice(&self, slice: SliceUpload) -> ApiResult<()> {
        (**self).upload_slice(slice).await
    }

    async fn upload_complete(&self, session_id: &str) -> ApiResult<UploadCompleteData> {
        (**self).upload_complete(session_id).await
    }
}
