// SPDX-License-Identifier: MIT

//! Shared test helpers: an in-memory store and a local mock server that
//! stands in for every external provider.

// Not every test binary uses every helper.
#![allow(dead_code)]

use axum::Router;
use std::sync::Arc;

use vitalog::config::Config;
use vitalog::db::Store;
use vitalog::AppState;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock");
    });
    format!("http://{}", addr)
}

/// Fresh application state with an in-memory database and every provider
/// client pointed at the mock server.
pub async fn test_state(mock_base_url: &str) -> Arc<AppState> {
    let store = Store::in_memory().await.expect("in-memory store");
    Arc::new(AppState::for_tests(Config::default(), store, mock_base_url))
}

/// State without any mock server, for store-only tests.
pub async fn store_only() -> Store {
    Store::in_memory().await.expect("in-memory store")
}
