use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

/// Configuration for the logging system
pub struct LogConfig {
    /// Directory where log files will be stored
    pub log_dir: PathBuf,
    /// Prefix for log file names
    pub file_prefix: String,
    /// Maximum number of log files to keep (rotation)
    pub max_files: usize,
    /// Whether to write logs to file
    pub log_to_file: bool,
    /// Log level filter string
    pub log_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: AppConfig::get_log_dir(),
            file_prefix: "pan123-upload".to_string(),
            max_files: 5,
            log_to_file: true,
            log_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Create LogConfig from the application settings
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            log_dir: AppConfig::get_log_dir(),
            file_prefix: "pan123-upload".to_string(),
            max_files: config.log_max_files,
            log_to_file: config.log_to_file,
            log_level: config.log_level.as_str().to_string(),
        }
    }
}

/// Initialize the logging system with file and stderr output
///
/// Stdout is left to the program's own output (the file id).
///
/// # Log Targets
/// - `api::client` - HTTP requests and responses
/// - `api::token` - Token cache and refresh
/// - `uploader` - Upload orchestration
/// - `uploader::slice` - Slice transfers and retries
/// - `uploader::poll` - Completion polling
/// - `main` - Application lifecycle
///
/// # Example
/// ```bash
/// # Set different levels for different components
/// RUST_LOG=uploader=debug,api::token=trace pan123-upload a.bin backup/a.bin
/// ```
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    // Configure environment filter with defaults
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Each branch builds its own stderr layer: a layer is typed by the
    // subscriber stack it is added to
    let worker_guard = if config.log_to_file {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .max_log_files(config.max_files)
            .build(&config.log_dir)
            .context("Failed to create file appender")?;

        let (non_blocking_file, worker_guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .compact()
            .with_writer(non_blocking_file)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE);

        let stderr_layer = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Some(worker_guard)
    } else {
        let stderr_layer = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_line_number(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        None
    };

    tracing::debug!(
        target: "main",
        log_dir = %config.log_dir.display(),
        max_files = config.max_files,
        log_to_file = config.log_to_file,
        log_level = %config.log_level,
        "Logging system initialized"
    );

    Ok(LogGuard {
        _worker_guard: worker_guard,
    })
}

/// Guard that ensures file logs are flushed before exit.
/// Must be kept alive for the whole program.
pub struct LogGuard {
    _worker_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}
