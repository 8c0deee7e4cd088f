// SPDX-License-Identifier: MIT

//! OAuth credential model shared by both providers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External data providers this service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Wearable-data provider, OAuth 2.0 authorization-code + refresh.
    Whoop,
    /// Nutrition-diary provider, OAuth 1.0 three-legged (per-user) plus
    /// OAuth 2.0 client-credentials (public search).
    FatSecret,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Whoop => "whoop",
            Provider::FatSecret => "fatsecret",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "whoop" => Ok(Provider::Whoop),
            "fatsecret" => Ok(Provider::FatSecret),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// One stored credential. At most one live row per (user, provider);
/// revocation deletes the row rather than flagging it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OAuthToken {
    pub user_id: i64,
    /// Provider tag, stored as text.
    pub provider: String,
    pub access_token: String,
    /// OAuth 1.0 token secret. None for OAuth 2.0 credentials.
    pub access_secret: Option<String>,
    /// OAuth 2.0 refresh token. None for OAuth 1.0 credentials.
    pub refresh_token: Option<String>,
    /// Access-token expiry. None for non-expiring (OAuth 1.0) tokens.
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Whether the token is usable without a refresh at `now`, given the
    /// proactive refresh margin. Tokens without an expiry never expire.
    pub fn usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + margin < expires_at,
            None => true,
        }
    }
}
