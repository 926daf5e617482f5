//! Error types for the 123pan API client

use thiserror::Error;

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential exchange failed or yielded an unusable token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request could not be sent or the response body could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-2xx status
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    /// Server answered 2xx but the envelope carries a non-zero code
    #[error("API error ({code}): {message}")]
    Protocol {
        code: i64,
        message: String,
        trace_id: Option<String>,
    },

    /// Response body did not match the endpoint's schema
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Local I/O failure (token cache)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Protocol { .. } => true,
            ApiError::Http { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }

    /// Whether the error stems from the credential exchange
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_)) || matches!(self, ApiError::Http { status: 401, .. })
    }

    /// Create a protocol error
    pub fn protocol(code: i64, message: impl Into<String>, trace_id: Option<String>) -> Self {
        ApiError::Protocol {
            code,
            message: message.into(),
            trace_id,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ApiError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                body: String::new(),
            };
        }
        ApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}
