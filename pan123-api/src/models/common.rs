use crate::error::{ApiError, ApiResult};
use serde::Deserialize;

/// Envelope wrapping every 123pan API response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(rename = "x-traceID", default)]
    pub trace_id: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Whether the server reported success
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Unwrap the payload, turning a non-zero code into a protocol error
    pub fn into_result(self) -> ApiResult<Option<T>> {
        if !self.is_success() {
            return Err(ApiError::protocol(self.code, self.message, self.trace_id));
        }
        Ok(self.data)
    }

    /// Like [`into_result`](Self::into_result) but requires a payload
    pub fn into_data(self) -> ApiResult<T> {
        let code = self.code;
        self.into_result()?.ok_or_else(|| {
            ApiError::InvalidResponse(format!("response with code {} carries no data", code))
        })
    }
}
