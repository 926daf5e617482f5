//! Application configuration loaded from `config.json`

use anyhow::{Context, Result, bail};
use pan123_api::ClientConfig;
use pan123_api::client::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::uploader::{ServerSelection, UploaderConfig};

/// Environment variable overriding the client id
pub const ENV_CLIENT_ID: &str = "PAN123_CLIENT_ID";
/// Environment variable overriding the client secret
pub const ENV_CLIENT_SECRET: &str = "PAN123_CLIENT_SECRET";

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Uploader tuning as written in the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadSettings {
    pub slice_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
    pub slice_timeout_secs: u64,
    pub server_selection: ServerSelection,
}

impl Default for UploadSettings {
    fn default() -> Self {
        let defaults = UploaderConfig::default();
        Self {
            slice_concurrency: defaults.slice_concurrency,
            max_retries: defaults.max_retries,
            retry_base_delay_ms: defaults.retry_base_delay.as_millis() as u64,
            retry_max_delay_ms: defaults.retry_max_delay.as_millis() as u64,
            poll_max_attempts: defaults.poll_max_attempts,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            slice_timeout_secs: 300,
            server_selection: defaults.server_selection,
        }
    }
}

impl UploadSettings {
    pub fn to_uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            slice_concurrency: self.slice_concurrency,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
            poll_max_attempts: self.poll_max_attempts,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            server_selection: self.server_selection,
        }
    }
}

/// Contents of `config.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(rename = "123ClientId", default)]
    pub client_id: String,
    #[serde(rename = "123ClientSecret", default)]
    pub client_secret: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Token cache file, defaults to `~/.pan123/access_token.json`
    #[serde(default)]
    pub token_cache: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_true")]
    pub log_to_file: bool,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: usize,
    #[serde(default)]
    pub upload: UploadSettings,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_max_files() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: default_base_url(),
            token_cache: None,
            timeout_secs: default_timeout_secs(),
            log_level: LogLevel::default(),
            log_to_file: true,
            log_max_files: default_log_max_files(),
            upload: UploadSettings::default(),
        }
    }
}

impl AppConfig {
    /// `~/.pan123`
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pan123")
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.json")
    }

    pub fn get_log_dir() -> PathBuf {
        Self::default_dir().join("logs")
    }

    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `~/.pan123/config.json` is
    /// read if present. Environment variables override the credentials.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply credential overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = id;
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.client_secret = secret;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            bail!("123ClientId not found in config.json (or {})", ENV_CLIENT_ID);
        }
        if self.client_secret.is_empty() {
            bail!(
                "123ClientSecret not found in config.json (or {})",
                ENV_CLIENT_SECRET
            );
        }
        self.upload
            .to_uploader_config()
            .validate()
            .context("Invalid upload settings")?;
        Ok(())
    }

    pub fn token_cache_path(&self) -> PathBuf {
        self.token_cache
            .clone()
            .unwrap_or_else(|| Self::default_dir().join("access_token.json"))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.client_id, &self.client_secret)
            .with_base_url(&self.base_url)
            .with_timeout(self.timeout_secs)
            .with_slice_timeout(Duration::from_secs(self.upload.slice_timeout_secs))
            .with_token_cache(self.token_cache_path())
    }

    pub fn uploader_config(&self) -> UploaderConfig {
        self.upload.to_uploader_config()
    }
}
