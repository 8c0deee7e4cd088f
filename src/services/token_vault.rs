// SPDX-License-Identifier: MIT

//! Credential vault shared by both providers.
//!
//! Thin layer over the token table plus per-(user, provider) refresh locks,
//! so concurrent callers never race a token refresh against each other.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::Store;
use crate::error::AppError;
use crate::models::{OAuthToken, Provider, User};

#[derive(Clone)]
pub struct TokenVault {
    store: Store,
    /// One lock per (user, provider), created lazily. Held across a refresh
    /// round-trip so parallel callers wait instead of double-refreshing.
    refresh_locks: Arc<DashMap<(i64, Provider), Arc<Mutex<()>>>>,
}

impl TokenVault {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn get(&self, user_id: i64, provider: Provider) -> Result<Option<OAuthToken>, AppError> {
        self.store.get_token(user_id, provider).await
    }

    pub async fn save(&self, token: &OAuthToken) -> Result<(), AppError> {
        self.store.save_token(token).await
    }

    /// Drop the credential. Called when a provider permanently rejects it;
    /// the next user interaction prompts a reconnect.
    pub async fn clear(&self, user_id: i64, provider: Provider) -> Result<(), AppError> {
        tracing::warn!(user_id, %provider, "Clearing revoked credential");
        self.store.delete_token(user_id, provider).await
    }

    pub async fn users_with_token(&self, provider: Provider) -> Result<Vec<User>, AppError> {
        self.store.users_with_token(provider).await
    }

    /// Tokens whose expiry falls within the next `minutes`, for the
    /// proactive refresh job.
    pub async fn expiring_within(
        &self,
        provider: Provider,
        minutes: i64,
    ) -> Result<Vec<OAuthToken>, AppError> {
        let cutoff = chrono::Utc::now() + chrono::Duration::minutes(minutes);
        self.store.tokens_expiring_before(provider, cutoff).await
    }

    /// The refresh lock for one (user, provider). Callers must re-read the
    /// stored token after acquiring it; another task may have already
    /// refreshed.
    pub fn refresh_lock(&self, user_id: i64, provider: Provider) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry((user_id, provider))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
