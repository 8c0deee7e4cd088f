// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! All provider credentials are read once at startup and held in memory.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- App ---
    /// SQLite connection string (e.g. "sqlite://vitalog.db").
    pub database_url: String,
    /// Public base URL of this service, used to build OAuth callback URLs.
    pub app_base_url: String,
    /// Server port
    pub port: u16,

    // --- WHOOP (OAuth 2.0) ---
    pub whoop_client_id: String,
    pub whoop_client_secret: String,
    pub whoop_redirect_uri: String,

    // --- FatSecret (OAuth 1.0 + client-credentials) ---
    /// Consumer key, shared by both auth schemes.
    pub fatsecret_client_id: String,
    /// OAuth 2.0 client secret for client-credentials.
    pub fatsecret_client_secret: String,
    /// OAuth 1.0 consumer (shared) secret for HMAC-SHA1 signing.
    pub fatsecret_shared_secret: String,

    // --- OpenAI ---
    pub openai_api_key: String,
    pub openai_model: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            app_base_url: "http://localhost:8000".to_string(),
            port: 8000,
            whoop_client_id: "test_whoop_id".to_string(),
            whoop_client_secret: "test_whoop_secret".to_string(),
            whoop_redirect_uri: "http://localhost:8000/auth/whoop/callback".to_string(),
            fatsecret_client_id: "test_fs_key".to_string(),
            fatsecret_client_secret: "test_fs_secret".to_string(),
            fatsecret_shared_secret: "test_fs_shared".to_string(),
            openai_api_key: "test_openai_key".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (.env supported).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),

            whoop_client_id: env::var("WHOOP_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("WHOOP_CLIENT_ID"))?,
            whoop_client_secret: env::var("WHOOP_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WHOOP_CLIENT_SECRET"))?,
            whoop_redirect_uri: env::var("WHOOP_REDIRECT_URI")
                .map_err(|_| ConfigError::Missing("WHOOP_REDIRECT_URI"))?,

            fatsecret_client_id: env::var("FATSECRET_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("FATSECRET_CLIENT_ID"))?,
            fatsecret_client_secret: env::var("FATSECRET_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FATSECRET_CLIENT_SECRET"))?,
            fatsecret_shared_secret: env::var("FATSECRET_SHARED_SECRET")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),

            openai_api_key: env::var("OPENAI_API_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
