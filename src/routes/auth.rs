// SPDX-License-Identifier: MIT

//! Provider OAuth routes: the wearable's OAuth 2.0 callback and the diary
//! provider's three-legged OAuth 1.0 connect flow.

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::{AppState, PendingHandshake};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/whoop/callback", get(whoop_callback))
        .route("/auth/fatsecret/connect", get(fatsecret_connect))
        .route("/auth/fatsecret/callback", get(fatsecret_callback))
}

#[derive(Deserialize)]
pub struct WhoopCallbackParams {
    #[serde(default)]
    code: Option<String>,
    /// Carries the user's chat key through the provider round-trip.
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth 2.0 callback: exchange the code and store the token pair.
async fn whoop_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WhoopCallbackParams>,
) -> Result<Html<String>> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Wearable authorization denied");
        return Ok(error_page(&format!("Authorization was denied: {}", error)));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;
    let chat_key = params
        .state
        .ok_or_else(|| AppError::BadRequest("Missing state parameter".to_string()))?;

    let user = state.store.get_or_create_user(&chat_key, "").await?;

    match state.whoop.handle_oauth_callback(&user, &code).await {
        Ok(()) => Ok(success_page(
            "Wearable connected! Your workouts, recovery and sleep will sync automatically.",
        )),
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "Wearable callback failed");
            Ok(error_page(
                "Connecting your wearable failed. Please try again.",
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct ConnectParams {
    user_key: String,
}

/// Start the diary provider's three-legged handshake and send the user to
/// the authorization page. The request secret is parked until the callback.
async fn fatsecret_connect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
) -> Result<Redirect> {
    let user = state.store.get_or_create_user(&params.user_key, "").await?;

    let callback_url = format!("{}/auth/fatsecret/callback", state.config.app_base_url);
    let start = state.fatsecret.connect_start(&callback_url).await?;

    state.pending_handshakes.insert(
        start.request_token.clone(),
        PendingHandshake {
            user_id: user.id,
            request_secret: start.request_secret,
        },
    );

    tracing::info!(user_id = user.id, "Diary handshake started");
    Ok(Redirect::temporary(&start.authorize_url))
}

#[derive(Deserialize)]
pub struct FatSecretCallbackParams {
    oauth_token: String,
    oauth_verifier: String,
}

/// Finish the handshake: trade the approved request token for the
/// permanent pair.
async fn fatsecret_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FatSecretCallbackParams>,
) -> Result<Html<String>> {
    let (_, pending) = state
        .pending_handshakes
        .remove(&params.oauth_token)
        .ok_or_else(|| {
            AppError::BadRequest("Unknown or expired handshake, start over".to_string())
        })?;

    let user = state
        .store
        .get_user(pending.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", pending.user_id)))?;

    match state
        .fatsecret
        .connect_finish(
            &user,
            &params.oauth_token,
            &pending.request_secret,
            &params.oauth_verifier,
        )
        .await
    {
        Ok(()) => Ok(success_page(
            "Food diary connected! Meals you log in either place will stay in sync.",
        )),
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "Diary callback failed");
            Ok(error_page(
                "Connecting your food diary failed. Please try again.",
            ))
        }
    }
}

fn success_page(message: &str) -> Html<String> {
    Html(format!(
        "<html><body style=\"font-family: sans-serif; text-align: center; padding-top: 4em\">\
         <h1>&#9989; Connected</h1><p>{}</p>\
         <p>You can close this tab and return to the chat.</p></body></html>",
        message
    ))
}

fn error_page(message: &str) -> Html<String> {
    Html(format!(
        "<html><body style=\"font-family: sans-serif; text-align: center; padding-top: 4em\">\
         <h1>&#10060; Something went wrong</h1><p>{}</p></body></html>",
        message
    ))
}
