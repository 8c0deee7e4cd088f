// SPDX-License-Identifier: MIT

//! Core API routes: health, food search, and the message endpoint that
//! fronts the conversational assistant.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::fatsecret::FoodSummary;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/food/search", get(food_search))
        .route("/message", post(message))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// Public food database search.
async fn food_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<FoodSummary>>> {
    if params.q.trim().is_empty() {
        return Err(AppError::BadRequest("Query must not be empty".to_string()));
    }
    let foods = state
        .fatsecret
        .search_foods(params.q.trim(), params.limit)
        .await?;
    Ok(Json(foods))
}

#[derive(Deserialize)]
pub struct MessageRequest {
    /// Stable key from the messaging transport.
    pub user_key: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Plain text message.
    #[serde(default)]
    pub text: Option<String>,
    /// Base64-encoded voice recording, transcribed before handling.
    #[serde(default)]
    pub voice_b64: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub reply: String,
}

/// One assistant turn: classify, dispatch, reply.
async fn message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>> {
    let username = request.username.as_deref().unwrap_or("");

    let reply = match (request.text, request.voice_b64) {
        (Some(text), _) if !text.trim().is_empty() => {
            state
                .chat
                .handle_message(&request.user_key, username, text.trim())
                .await?
        }
        (_, Some(voice_b64)) => {
            let audio = STANDARD
                .decode(voice_b64.as_bytes())
                .map_err(|e| AppError::BadRequest(format!("Invalid voice payload: {}", e)))?;
            state
                .chat
                .handle_voice(&request.user_key, username, audio)
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "Either text or voice_b64 is required".to_string(),
            ))
        }
    };

    Ok(Json(MessageResponse { reply }))
}
