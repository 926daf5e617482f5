//! Access token lifecycle: file-backed cache plus lazy, single-flight refresh

use crate::error::{ApiError, ApiResult};
use crate::models::token::AccessToken;
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Source of fresh tokens (the credential exchange call)
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> ApiResult<AccessToken>;
}

/// Small JSON file holding the last token.
///
/// A store without a path keeps nothing on disk.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    path: Option<PathBuf>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the cached token. A missing or unreadable cache yields `None`.
    pub async fn load(&self) -> ApiResult<Option<AccessToken>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<AccessToken>(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(
                    target: "api::token",
                    path = %path.display(),
                    error = %e,
                    "Ignoring corrupt token cache"
                );
                Ok(None)
            }
        }
    }

    /// Persist the token via write-to-temp-then-rename
    pub async fn save(&self, token: &AccessToken) -> ApiResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_vec(token)?;
        let tmp_path = tmp_path_for(path);
        tokio::fs::write(&tmp_path, &content).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!(target: "api::token", path = %path.display(), "Token cache written");
        Ok(())
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp name, unique per process and per write
fn tmp_path_for(path: &Path) -> PathBuf {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{}.tmp", std::process::id(), seq));
    path.with_file_name(name)
}

/// Owns the process-wide access token.
///
/// Validity is checked on every call; a refresh happens only when both the
/// in-memory token and the cache are missing or expired. Concurrent callers
/// that observe an expired token share a single credential exchange.
pub struct TokenManager {
    exchange: Box<dyn CredentialExchange>,
    store: TokenStore,
    current: RwLock<Option<AccessToken>>,
    refresh_lock: Mutex<()>,
    /// Set by `invalidate`: the cache holds the revoked token and must be skipped
    force_refresh: AtomicBool,
}

impl TokenManager {
    pub fn new(exchange: Box<dyn CredentialExchange>, store: TokenStore) -> Self {
        Self {
            exchange,
            store,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            force_refresh: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Return a usable bearer token, refreshing it if needed
    pub async fn get_token(&self) -> ApiResult<String> {
        if let Some(token) = self.valid_in_memory().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.valid_in_memory().await {
            return Ok(token);
        }

        if self.force_refresh.load(Ordering::Acquire) {
            return self.refresh_locked().await;
        }

        match self.store.load().await {
            Ok(Some(cached)) if cached.is_valid_at(Utc::now()) => {
                debug!(
                    target: "api::token",
                    expired_at = %cached.expired_at,
                    "Using cached access token"
                );
                let value = cached.access_token.clone();
                *self.current.write().await = Some(cached);
                return Ok(value);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "api::token", error = %e, "Failed to read token cache");
            }
        }

        self.refresh_locked().await
    }

    /// Replace the in-memory token without touching the cache
    pub async fn set_token(&self, token: AccessToken) {
        *self.current.write().await = Some(token);
        self.force_refresh.store(false, Ordering::Release);
    }

    /// Drop a token known to be revoked.
    ///
    /// The next call performs a credential exchange; the cached copy is not reused.
    pub async fn invalidate(&self) {
        let _guard = self.refresh_lock.lock().await;
        *self.current.write().await = None;
        self.force_refresh.store(true, Ordering::Release);
    }

    /// Snapshot of the in-memory token
    pub async fn current(&self) -> Option<AccessToken> {
        self.current.read().await.clone()
    }

    async fn valid_in_memory(&self) -> Option<String> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|t| t.is_valid_at(Utc::now()))
            .map(|t| t.access_token.clone())
    }

    /// Caller must hold `refresh_lock`
    async fn refresh_locked(&self) -> ApiResult<String> {
        info!(target: "api::token", "Refreshing access token");

        let token = self.exchange.exchange().await.map_err(|e| match e {
            ApiError::Auth(_) => e,
            other => ApiError::Auth(other.to_string()),
        })?;

        if token.access_token.is_empty() {
            return Err(ApiError::Auth(
                "credential exchange returned an empty token".to_string(),
            ));
        }
        if !token.is_valid_at(Utc::now()) {
            return Err(ApiError::Auth(format!(
                "credential exchange returned a token already expired at {}",
                token.expired_at
            )));
        }

        if let Err(e) = self.store.save(&token).await {
            warn!(target: "api::token", error = %e, "Failed to persist access token");
        }

        info!(
            target: "api::token",
            expired_at = %token.expired_at,
            "Access token refreshed"
        );

        let value = token.access_token.clone();
        *self.current.write().await = Some(token);
        self.force_refresh.store(false, Ordering::Release);
        Ok(value)
    }
}
