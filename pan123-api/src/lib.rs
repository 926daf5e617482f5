//! # 123pan API Client
//!
//! A Rust client for the 123pan open platform with automatic access token management.
//!
//! ## Features
//!
//! - Lazy access token refresh backed by a JSON cache file
//! - Single-flight refresh when many requests observe an expired token
//! - Typed chunked-upload endpoints behind the [`api::UploadApi`] trait
//!
//! ## Example
//!
//! ```no_run
//! use pan123_api::api::UploadApi;
//! use pan123_api::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("client-id", "client-secret")
//!         .with_token_cache("access_token.json");
//!     let client = Client::new(config)?;
//!
//!     // The token is fetched on first use and reused until it expires
//!     let done = client.upload_complete("preupload-id").await?;
//!     println!("completed = {}", done.completed);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod token;

pub use client::{Client, ClientConfig, RequestOptions};
pub use error::{ApiError, ApiResult};
pub use models::token::AccessToken;
pub use models::upload::{DuplicatePolicy, UploadSession};
pub use token::{CredentialExchange, TokenManager, TokenStore};
