// SPDX-License-Identifier: MIT

//! Personal health aggregation service.
//!
//! Connects a wearable provider (OAuth 2.0) and a nutrition-diary provider
//! (OAuth 1.0), syncs their data on a schedule, and fronts everything with
//! a conversational assistant driven by LLM intent classification.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use dashmap::DashMap;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    ChatService, FatSecretClient, FatSecretService, OpenAiClient, SyncEngine, TokenVault,
    WhoopClient, WhoopService,
};

/// An OAuth 1.0 handshake in flight: the request secret must survive
/// between the connect redirect and the provider's callback.
#[derive(Debug, Clone)]
pub struct PendingHandshake {
    pub user_id: i64,
    pub request_secret: String,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub whoop: WhoopService,
    pub fatsecret: FatSecretService,
    pub chat: ChatService,
    pub sync: SyncEngine,
    /// In-flight diary handshakes, keyed by request token.
    pub pending_handshakes: DashMap<String, PendingHandshake>,
}

impl AppState {
    /// Wire every service from configuration and a connected store.
    pub fn new(config: Config, store: Store) -> Self {
        let vault = TokenVault::new(store.clone());

        let whoop_client = WhoopClient::new(
            config.whoop_client_id.clone(),
            config.whoop_client_secret.clone(),
            config.whoop_redirect_uri.clone(),
        );
        let whoop = WhoopService::new(whoop_client, vault.clone());

        let fatsecret_client = FatSecretClient::new(
            &config.fatsecret_client_id,
            &config.fatsecret_client_secret,
            &config.fatsecret_shared_secret,
        );
        let fatsecret = FatSecretService::new(fatsecret_client, vault.clone());

        let openai = OpenAiClient::new(&config.openai_api_key, &config.openai_model);
        let chat = ChatService::new(store.clone(), openai, fatsecret.clone());

        let sync = SyncEngine::new(store.clone(), vault, whoop.clone(), fatsecret.clone());

        Self {
            config,
            store,
            whoop,
            fatsecret,
            chat,
            sync,
            pending_handshakes: DashMap::new(),
        }
    }

    /// Same wiring, but with every provider client pointed at one test
    /// server.
    pub fn for_tests(config: Config, store: Store, mock_base_url: &str) -> Self {
        let vault = TokenVault::new(store.clone());

        let whoop_client = WhoopClient::new(
            config.whoop_client_id.clone(),
            config.whoop_client_secret.clone(),
            config.whoop_redirect_uri.clone(),
        )
        .with_base_url(mock_base_url);
        let whoop = WhoopService::new(whoop_client, vault.clone());

        let fatsecret_client = FatSecretClient::new(
            &config.fatsecret_client_id,
            &config.fatsecret_client_secret,
            &config.fatsecret_shared_secret,
        )
        .with_base_url(mock_base_url);
        let fatsecret = FatSecretService::new(fatsecret_client, vault.clone());

        let openai =
            OpenAiClient::new(&config.openai_api_key, &config.openai_model).with_base_url(mock_base_url);
        let chat = ChatService::new(store.clone(), openai, fatsecret.clone());

        let sync = SyncEngine::new(store.clone(), vault, whoop.clone(), fatsecret.clone());

        Self {
            config,
            store,
            whoop,
            fatsecret,
            chat,
            sync,
            pending_handshakes: DashMap::new(),
        }
    }
}
