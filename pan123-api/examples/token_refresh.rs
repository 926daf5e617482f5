use chrono::{Duration, Utc};
use pan123_api::api::UploadApi;
use pan123_api::{AccessToken, Client, ClientConfig};

/// This example demonstrates lazy access token management
///
/// The client:
/// 1. Loads the cached token from disk on first use
/// 2. Exchanges the client credentials when the token is missing, expired or invalidated
/// 3. Writes the new token back to the cache file
///
/// Concurrent requests that all see an expired token share one exchange.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::new("your-client-id", "your-client-secret")
        .with_token_cache("access_token.json")
        .with_timeout(30);
    let client = Client::new(config)?;

    println!("=== Fetching a token ===");
    let token = client.tokens().get_token().await?;
    println!("✓ Got access token ({} chars)", token.len());
    if let Some(current) = client.tokens().current().await {
        println!("  expires at {}", current.expired_at);
    }

    // A token the server reports as revoked is dropped together with its cached copy
    println!("\n=== Invalidating the token ===");
    client.tokens().invalidate().await;
    let refreshed = client.tokens().get_token().await?;
    println!("✓ Exchanged credentials again, new token differs: {}", refreshed != token);

    // An expired in-memory token falls back to the cache, which is still valid
    println!("\n=== Simulating token expiration ===");
    client
        .tokens()
        .set_token(AccessToken {
            access_token: "stale".to_string(),
            expired_at: Utc::now() - Duration::minutes(1),
        })
        .await;

    match client.upload_complete("unknown-preupload-id").await {
        Ok(done) => println!("✓ Request succeeded, completed = {}", done.completed),
        Err(e) if e.is_auth() => println!("✗ Credentials rejected: {}", e),
        Err(e) => println!("✗ Request failed after refresh: {}", e),
    }

    Ok(())
}
