use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token returned by the credential exchange.
///
/// The same shape is persisted to the token cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    /// Parsed with any UTC offset and normalised to UTC
    pub expired_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, expired_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expired_at,
        }
    }

    /// A token is usable iff `now` is strictly before its expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expired_at
    }
}

/// Credential exchange request
#[derive(Debug, Clone, Serialize)]
pub struct AccessTokenRequest {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}
