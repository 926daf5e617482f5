//! Error types for the uploader module

use pan123_api::ApiError;
use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Upload error types
#[derive(Debug, Error)]
pub enum UploadError {
    /// Upload was cancelled
    #[error("Upload cancelled")]
    Cancelled,

    /// Credential exchange failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network failure or non-2xx HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success application code
    #[error("Server rejected request ({code}): {message}")]
    Protocol { code: i64, message: String },

    /// Server answered with a body we could not interpret
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Completion polling ran out of attempts; the file may still appear later
    #[error(
        "Session {session_id} not assembled after {attempts} polls, outcome unknown (check the destination manually)"
    )]
    Timeout { session_id: String, attempts: u32 },

    /// Malformed local input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to read local file
    #[error("Failed to read local file: {0}")]
    FileReadError(String),

    /// A slice failed after exhausting its retries
    #[error("Slice {index} upload failed: {source}")]
    SliceFailed {
        index: u64,
        #[source]
        source: Box<UploadError>,
    },
}

impl UploadError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Transport(_) | UploadError::Protocol { .. } => true,
            UploadError::SliceFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error is due to cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// Timeouts mean "unknown outcome", not "failed"
    pub fn is_timeout(&self) -> bool {
        matches!(self, UploadError::Timeout { .. })
    }

    /// Short name of the error kind, for user-facing reports
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Cancelled => "cancelled",
            UploadError::Auth(_) => "auth",
            UploadError::Transport(_) => "transport",
            UploadError::Protocol { .. } => "protocol",
            UploadError::InvalidResponse(_) => "invalid-response",
            UploadError::Timeout { .. } => "timeout",
            UploadError::InvalidArgument(_) => "invalid-argument",
            UploadError::FileReadError(_) => "file-read",
            UploadError::SliceFailed { source, .. } => source.kind(),
        }
    }

    /// Wrap an error with the slice it belongs to
    pub fn slice_failed(index: u64, source: UploadError) -> Self {
        UploadError::SliceFailed {
            index,
            source: Box::new(source),
        }
    }
}

impl From<ApiError> for UploadError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(msg) => UploadError::Auth(msg),
            ApiError::Network(msg) => UploadError::Transport(msg),
            ApiError::Http { status, url, body } => {
                UploadError::Transport(format!("HTTP {} from {}: {}", status, url, body))
            }
            ApiError::Protocol { code, message, .. } => UploadError::Protocol { code, message },
            ApiError::InvalidResponse(msg) => UploadError::InvalidResponse(msg),
            ApiError::InvalidArgument(msg) => UploadError::InvalidArgument(msg),
            ApiError::Io(e) => UploadError::FileReadError(e.to_string()),
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::FileReadError(err.to_string())
    }
}
