use crate::error::{ApiError, ApiResult};
use crate::models::common::ApiResponse;
use crate::models::token::{AccessToken, AccessTokenRequest};
use crate::token::{CredentialExchange, TokenManager, TokenStore};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default open-platform endpoint
pub const DEFAULT_BASE_URL: &str = "https://open-api.123pan.com";

/// Header required by every open-platform call
const PLATFORM_HEADER: (&str, &str) = ("Platform", "open_platform");

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Timeout applied to every request, in seconds
    pub timeout_secs: u64,
    /// Timeout for a single slice transfer
    pub slice_timeout: Duration,
    /// Token cache file; `None` keeps the token in memory only
    pub token_cache: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout_secs: 30,
            slice_timeout: Duration::from_secs(300),
            token_cache: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn with_slice_timeout(mut self, timeout: Duration) -> Self {
        self.slice_timeout = timeout;
        self
    }

    pub fn with_token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache = Some(path.into());
        self
    }

    fn validate(&self) -> ApiResult<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(ApiError::InvalidArgument(
                "client id and client secret must not be empty".to_string(),
            ));
        }
        validate_base_url(&self.base_url)
    }
}

fn validate_base_url(base_url: &str) -> ApiResult<()> {
    url::Url::parse(base_url)
        .map_err(|e| ApiError::InvalidArgument(format!("invalid base url {}: {}", base_url, e)))?;
    Ok(())
}

fn build_http(config: &ClientConfig) -> ApiResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ApiError::InvalidArgument(format!("failed to build HTTP client: {}", e)))
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub(crate) with_credential: bool,
    pub(crate) base_url: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self {
            with_credential: true,
            base_url: None,
            timeout: None,
        }
    }

    /// Skip the bearer header (credential exchange)
    pub fn no_credential(mut self) -> Self {
        self.with_credential = false;
        self
    }

    /// Send to another host, e.g. an upload server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP transport for the 123pan open platform
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: Arc<TokenManager>,
}

impl Client {
    /// Create a client whose tokens come from the HTTP credential exchange
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        config.validate()?;
        let http = build_http(&config)?;

        let exchange = HttpCredentialExchange {
            http: http.clone(),
            base_url: config.base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        };
        let store = match &config.token_cache {
            Some(path) => TokenStore::new(path.clone()),
            None => TokenStore::in_memory(),
        };
        let tokens = Arc::new(TokenManager::new(Box::new(exchange), store));

        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Create a client sharing another client's token manager.
    ///
    /// Credentials are not needed here; the shared manager already owns the exchange.
    pub fn with_token_manager(
        config: ClientConfig,
        tokens: Arc<TokenManager>,
    ) -> ApiResult<Self> {
        validate_base_url(&config.base_url)?;
        let http = build_http(&config)?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// POST a JSON body and return the envelope payload
    pub async fn post<B, T>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url_for(endpoint, &options)?;
        let builder = self.http.post(&url).json(body);
        self.execute::<T>(Method::POST, builder, &options)
            .await?
            .into_data()
    }

    /// POST a multipart form; success is judged by the envelope code only
    pub async fn post_multipart(
        &self,
        endpoint: &str,
        form: reqwest::multipart::Form,
        options: RequestOptions,
    ) -> ApiResult<()> {
        let url = self.url_for(endpoint, &options)?;
        let builder = self.http.post(&url).multipart(form);
        self.execute::<serde::de::IgnoredAny>(Method::POST, builder, &options)
            .await?
            .into_result()?;
        Ok(())
    }

    fn url_for(&self, endpoint: &str, options: &RequestOptions) -> ApiResult<String> {
        let base = options.base_url.as_deref().unwrap_or(&self.config.base_url);
        join_url(base, endpoint)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        builder: RequestBuilder,
        options: &RequestOptions,
    ) -> ApiResult<ApiResponse<T>> {
        let mut builder = builder.header(PLATFORM_HEADER.0, PLATFORM_HEADER.1);
        if options.with_credential {
            let token = self.tokens.get_token().await?;
            builder = builder.bearer_auth(token);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        debug!(
            target: "api::client",
            method = %method,
            url = %url,
            status = status.as_u16(),
            "API request finished"
        );
        trace!(target: "api::client", body = %body, "Response body");

        parse_response(status, &url, &body)
    }
}

/// Join a base URL and an endpoint path, validating the result
pub(crate) fn join_url(base: &str, endpoint: &str) -> ApiResult<String> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    url::Url::parse(&joined)
        .map_err(|e| ApiError::InvalidArgument(format!("invalid request url {}: {}", joined, e)))?;
    Ok(joined)
}

/// Map an HTTP response onto the API envelope.
///
/// Non-2xx becomes [`ApiError::Http`]; the envelope's code is checked by the caller.
pub(crate) fn parse_response<T: DeserializeOwned>(
    status: StatusCode,
    url: &str,
    body: &str,
) -> ApiResult<ApiResponse<T>> {
    if !status.is_success() {
        return Err(ApiError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body: truncate(body, 512),
        });
    }
    serde_json::from_str::<ApiResponse<T>>(body).map_err(|e| {
        ApiError::InvalidResponse(format!("{} returned an unexpected body: {}", url, e))
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Credential exchange over `POST /api/v1/access_token`
struct HttpCredentialExchange {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

#[async_trait]
impl CredentialExchange for HttpCredentialExchange {
    async fn exchange(&self) -> ApiResult<AccessToken> {
        let url = join_url(&self.base_url, "/api/v1/access_token")?;
        let request = AccessTokenRequest {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        };

        let response = self
            .http
            .post(&url)
            .header(PLATFORM_HEADER.0, PLATFORM_HEADER.1)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        parse_response::<AccessToken>(status, &url, &body)?
            .into_data()
            .map_err(|e| ApiError::Auth(e.to_string()))
    }
}
