pub mod config;
pub mod logging;
pub mod uploader;

// Re-export commonly used types
pub use config::AppConfig;
pub use logging::{LogConfig, LogGuard};
pub use uploader::{UploadError, UploadRequest, UploadResult, Uploader, UploaderConfig};
