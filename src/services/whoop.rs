// SPDX-License-Identifier: MIT

//! Wearable-data provider client (OAuth 2.0) and its token-managing service.
//!
//! Handles:
//! - Authorization-code exchange and refresh-token rotation
//! - Workout / recovery / sleep collection fetching with pagination
//! - Proactive refresh (5-minute margin) with per-user locking
//! - Terminal refresh failures (400/401/403) clearing the stored credential

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;

use crate::error::AppError;
use crate::models::{OAuthToken, Provider, User};
use crate::services::TokenVault;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Attempts for the refresh round-trip when the network itself fails.
const REFRESH_CONNECT_ATTEMPTS: u32 = 3;

/// Page size for collection endpoints.
const COLLECTION_PAGE_LIMIT: u32 = 25;

/// Hard cap on pagination, in case a provider misbehaves.
const MAX_COLLECTION_PAGES: u32 = 10;

/// Low-level API client.
#[derive(Clone)]
pub struct WhoopClient {
    http: reqwest::Client,
    base_url: String,
    auth_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl WhoopClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.prod.whoop.com/developer/v1".to_string(),
            auth_url: "https://api.prod.whoop.com/oauth/oauth2/token".to_string(),
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.auth_url = format!("{}/oauth/oauth2/token", self.base_url);
        self
    }

    /// Exchange an authorization code for the initial token pair.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.auth_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::AuthRequestFailed(format!("Code exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Code exchange rejected");
            return Err(AppError::AuthRequestFailed(format!(
                "Code exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("Token response: {}", e)))
    }

    /// Refresh an expiring token pair. The provider rotates the refresh
    /// token on every call, so the response must always be persisted.
    ///
    /// 400/401/403 means the stored refresh token is dead for good; network
    /// failures are retried with linear backoff before giving up.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let mut last_err = None;
        for attempt in 1..=REFRESH_CONNECT_ATTEMPTS {
            let result = self
                .http
                .post(&self.auth_url)
                .form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("scope", "offline"),
                ])
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Token refresh connection failed");
                    last_err = Some(AppError::Provider(format!("Refresh request failed: {}", e)));
                    tokio::time::sleep(StdDuration::from_secs(attempt as u64)).await;
                    continue;
                }
            };

            let status = response.status().as_u16();
            if matches!(status, 400 | 401 | 403) {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status, body = %body, "Refresh token rejected permanently");
                return Err(AppError::TokenRevoked(Provider::Whoop));
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Provider(format!("HTTP {}: {}", status, body)));
            }

            return response
                .json()
                .await
                .map_err(|e| AppError::MalformedResponse(format!("Token response: {}", e)));
        }

        Err(last_err
            .unwrap_or_else(|| AppError::Provider("Refresh retries exhausted".to_string())))
    }

    /// Workouts started at or after `since` (RFC 3339).
    pub async fn list_workouts(
        &self,
        access_token: &str,
        since: &str,
    ) -> Result<Vec<WhoopWorkout>, AppError> {
        self.get_collection(access_token, "/activity/workout", since)
            .await
    }

    /// Physiological cycles (recovery lives on the cycle's score).
    pub async fn list_recoveries(
        &self,
        access_token: &str,
        since: &str,
    ) -> Result<Vec<WhoopRecovery>, AppError> {
        self.get_collection(access_token, "/recovery", since).await
    }

    /// Sleep sessions started at or after `since`.
    pub async fn list_sleeps(
        &self,
        access_token: &str,
        since: &str,
    ) -> Result<Vec<WhoopSleep>, AppError> {
        self.get_collection(access_token, "/activity/sleep", since)
            .await
    }

    /// Paginated collection fetch. Follows `next_token` until the provider
    /// runs out of pages.
    async fn get_collection<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &str,
        path: &str,
        since: &str,
    ) -> Result<Vec<T>, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..MAX_COLLECTION_PAGES {
            let mut query: Vec<(&str, String)> = vec![
                ("start", since.to_string()),
                ("limit", COLLECTION_PAGE_LIMIT.to_string()),
            ];
            if let Some(token) = &next_token {
                query.push(("nextToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await
                .map_err(|e| AppError::Provider(e.to_string()))?;

            let page: CollectionPage<T> = self.check_response_json(response).await?;
            records.extend(page.records);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Wearable provider rate limit hit (429)");
                return Err(AppError::RateLimited);
            }

            if status.as_u16() == 401 {
                return Err(AppError::AuthRequestFailed("unauthorized".to_string()));
            }

            return Err(AppError::Provider(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("JSON parse error: {}", e)))
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct CollectionPage<T> {
    records: Vec<T>,
    next_token: Option<String>,
}

/// One workout record.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopWorkout {
    pub id: String,
    pub start: String,
    pub score_state: String,
    pub score: Option<WorkoutScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkoutScore {
    pub strain: Option<f64>,
    pub kilojoule: Option<f64>,
}

/// One recovery record, keyed by its physiological cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopRecovery {
    pub cycle_id: i64,
    pub created_at: String,
    pub score_state: String,
    pub score: Option<RecoveryScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryScore {
    pub recovery_score: Option<f64>,
}

/// One sleep session.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoopSleep {
    pub id: String,
    pub start: String,
    pub score_state: String,
    pub score: Option<SleepScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepScore {
    pub stage_summary: Option<StageSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageSummary {
    pub total_in_bed_time_milli: Option<f64>,
    pub total_awake_time_milli: Option<f64>,
}

impl WhoopWorkout {
    /// Burned energy in kcal, converted from kilojoules.
    pub fn calories(&self) -> Option<f64> {
        self.score
            .as_ref()
            .and_then(|s| s.kilojoule)
            .map(|kj| kj / 4.184)
    }
}

impl WhoopSleep {
    /// Actual sleep minutes: time in bed minus time awake.
    pub fn sleep_minutes(&self) -> Option<f64> {
        let summary = self.score.as_ref()?.stage_summary.as_ref()?;
        let in_bed = summary.total_in_bed_time_milli?;
        let awake = summary.total_awake_time_milli.unwrap_or(0.0);
        Some((in_bed - awake) / 60_000.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WhoopService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

/// High-level service that manages the token lifecycle around API calls.
///
/// Callers never see raw tokens: every wrapper resolves a valid access token
/// first, refreshing proactively inside the 5-minute margin, and retries
/// once after a forced refresh if the provider still rejects it.
#[derive(Clone)]
pub struct WhoopService {
    client: WhoopClient,
    vault: TokenVault,
}

impl WhoopService {
    pub fn new(client: WhoopClient, vault: TokenVault) -> Self {
        Self { client, vault }
    }

    // ─── OAuth Callback Handling ─────────────────────────────────

    /// Exchange the callback code and store the resulting credential.
    pub async fn handle_oauth_callback(&self, user: &User, code: &str) -> Result<(), AppError> {
        let tokens = self.client.exchange_code(code).await?;
        self.store_tokens(user.id, &tokens).await?;
        tracing::info!(user_id = user.id, "Wearable provider connected");
        Ok(())
    }

    // ─── Token Management ────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// Fast path reads the stored token; if it is inside the refresh margin,
    /// the per-user lock is taken, the token re-read (another task may have
    /// refreshed while we waited), and only then is a refresh performed.
    pub async fn get_valid_access_token(&self, user_id: i64) -> Result<String, AppError> {
        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        let token = self
            .vault
            .get(user_id, Provider::Whoop)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wearable token for user {}", user_id)))?;

        if token.usable_at(now, margin) {
            return Ok(token.access_token);
        }

        let lock = self.vault.refresh_lock(user_id, Provider::Whoop);
        let _guard = lock.lock().await;

        // Double-check after acquiring the lock.
        let token = self
            .vault
            .get(user_id, Provider::Whoop)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wearable token for user {}", user_id)))?;

        if token.usable_at(Utc::now(), margin) {
            return Ok(token.access_token);
        }

        self.refresh_and_store(&token).await
    }

    /// Force a refresh regardless of stored expiry. Used after the provider
    /// rejects a token the expiry said was fine.
    async fn force_refresh(&self, user_id: i64) -> Result<String, AppError> {
        let lock = self.vault.refresh_lock(user_id, Provider::Whoop);
        let _guard = lock.lock().await;

        let token = self
            .vault
            .get(user_id, Provider::Whoop)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wearable token for user {}", user_id)))?;

        self.refresh_and_store(&token).await
    }

    /// Refresh under an already-held lock and persist the rotated pair.
    /// Terminal rejections clear the credential.
    async fn refresh_and_store(&self, token: &OAuthToken) -> Result<String, AppError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(AppError::TokenRevoked(Provider::Whoop))?;

        tracing::info!(user_id = token.user_id, "Access token expiring, refreshing");

        match self.client.refresh_token(refresh_token).await {
            Ok(new_tokens) => {
                self.store_tokens(token.user_id, &new_tokens).await?;
                tracing::info!(user_id = token.user_id, "Token refreshed and stored");
                Ok(new_tokens.access_token)
            }
            Err(AppError::TokenRevoked(provider)) => {
                self.vault.clear(token.user_id, provider).await?;
                Err(AppError::TokenRevoked(provider))
            }
            Err(e) => Err(e),
        }
    }

    async fn store_tokens(&self, user_id: i64, tokens: &TokenResponse) -> Result<(), AppError> {
        let stored = OAuthToken {
            user_id,
            provider: Provider::Whoop.as_str().to_string(),
            access_token: tokens.access_token.clone(),
            access_secret: None,
            refresh_token: Some(tokens.refresh_token.clone()),
            expires_at: Some(Utc::now() + Duration::seconds(tokens.expires_in)),
        };
        self.vault.save(&stored).await
    }

    /// Proactively refresh every token expiring within `minutes`. Failures
    /// are logged per user and never stop the batch.
    pub async fn refresh_expiring(&self, minutes: i64) -> Result<usize, AppError> {
        let expiring = self.vault.expiring_within(Provider::Whoop, minutes).await?;
        let mut refreshed = 0;

        for token in expiring {
            let lock = self.vault.refresh_lock(token.user_id, Provider::Whoop);
            let _guard = lock.lock().await;

            // Re-read: a request may have refreshed this token already.
            let current = match self.vault.get(token.user_id, Provider::Whoop).await? {
                Some(t) => t,
                None => continue,
            };
            if current.usable_at(Utc::now(), Duration::minutes(minutes)) {
                continue;
            }

            match self.refresh_and_store(&current).await {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    tracing::warn!(user_id = token.user_id, error = %e, "Proactive refresh failed");
                }
            }
        }

        Ok(refreshed)
    }

    // ─── API Wrappers ────────────────────────────────────────────

    /// Workouts since `since`, with one forced-refresh retry on a 401.
    pub async fn list_workouts(
        &self,
        user_id: i64,
        since: &str,
    ) -> Result<Vec<WhoopWorkout>, AppError> {
        let access_token = self.get_valid_access_token(user_id).await?;
        match self.client.list_workouts(&access_token, since).await {
            Err(ref e) if e.is_token_error() => {
                let access_token = self.force_refresh(user_id).await?;
                self.client.list_workouts(&access_token, since).await
            }
            other => other,
        }
    }

    /// Recovery records since `since`, with one forced-refresh retry.
    pub async fn list_recoveries(
        &self,
        user_id: i64,
        since: &str,
    ) -> Result<Vec<WhoopRecovery>, AppError> {
        let access_token = self.get_valid_access_token(user_id).await?;
        match self.client.list_recoveries(&access_token, since).await {
            Err(ref e) if e.is_token_error() => {
                let access_token = self.force_refresh(user_id).await?;
                self.client.list_recoveries(&access_token, since).await
            }
            other => other,
        }
    }

    /// Sleep sessions since `since`, with one forced-refresh retry.
    pub async fn list_sleeps(
        &self,
        user_id: i64,
        since: &str,
    ) -> Result<Vec<WhoopSleep>, AppError> {
        let access_token = self.get_valid_access_token(user_id).await?;
        match self.client.list_sleeps(&access_token, since).await {
            Err(ref e) if e.is_token_error() => {
                let access_token = self.force_refresh(user_id).await?;
                self.client.list_sleeps(&access_token, since).await
            }
            other => other,
        }
    }
}
