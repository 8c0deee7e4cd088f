// SPDX-License-Identifier: MIT

//! HTTP routes.

pub mod api;
pub mod auth;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the full application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::routes())
        .merge(auth::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
