// SPDX-License-Identifier: MIT

//! End-to-end assistant flows against mock LLM and food-database servers:
//! logging food, querying today's numbers, deleting, goals, and voice.

mod common;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Classify like the real model would, keyed off the last user message.
fn classify_content(text: &str) -> String {
    let text = text.to_lowercase();
    let payload = if text.contains("impossible") {
        serde_json::json!({
            "intent": "log_food",
            "food_items": [{
                "name": "antimatter",
                "quantity_g": -50
            }]
        })
    } else if text.contains("chicken") {
        serde_json::json!({
            "intent": "log_food",
            "food_items": [{
                "name": "chicken breast",
                "quantity_g": 200,
                "meal_type": "lunch"
            }]
        })
    } else if text.contains("1800") {
        serde_json::json!({
            "intent": "general",
            "calorie_goal": 1800,
            "reply": "Okay!"
        })
    } else if text.contains("silly") {
        serde_json::json!({
            "intent": "general",
            "calorie_goal": 42,
            "reply": "Okay!"
        })
    } else if text.contains("today") {
        serde_json::json!({
            "intent": "query_data",
            "reply": "Here is your day so far."
        })
    } else if text.contains("delete") || text.contains("remove") {
        serde_json::json!({"intent": "delete_entry"})
    } else {
        serde_json::json!({"intent": "general", "reply": "Hi there!"})
    };
    payload.to_string()
}

fn mock_router() -> Router {
    Router::new()
        .route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let last_user = body["messages"]
                    .as_array()
                    .and_then(|m| {
                        m.iter()
                            .rev()
                            .find(|msg| msg["role"] == "user")
                            .and_then(|msg| msg["content"].as_str())
                    })
                    .unwrap_or("");
                Json(serde_json::json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": classify_content(last_user)
                        }
                    }]
                }))
            }),
        )
        .route(
            "/audio/transcriptions",
            post(|| async { Json(serde_json::json!({"text": "I ate 200g of chicken breast"})) }),
        )
        .route(
            "/connect/token",
            post(|| async {
                Json(serde_json::json!({
                    "access_token": "app-bearer",
                    "expires_in": 86400,
                    "token_type": "Bearer"
                }))
            }),
        )
        .route(
            "/rest/server.api",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                match params.get("method").map(String::as_str) {
                    Some("foods.search") => Json(serde_json::json!({
                        "foods": {
                            "food": [{
                                "food_id": "33691",
                                "food_name": "Chicken Breast",
                                "food_description": "Per 100g - Calories: 165kcal | Fat: 3.60g | Carbs: 0.00g | Protein: 31.00g"
                            }]
                        }
                    })),
                    other => Json(serde_json::json!({
                        "error": {"code": 1, "message": format!("unexpected method {:?}", other)}
                    })),
                }
            }),
        )
}

#[tokio::test]
async fn logging_food_scales_macros_and_reports_totals() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "I ate 200g of chicken breast")
        .await
        .unwrap();

    assert!(reply.contains("Chicken Breast"), "reply: {}", reply);
    assert!(reply.contains("330"), "reply: {}", reply);
    assert!(reply.contains("Protein 62"), "reply: {}", reply);
    assert!(reply.contains("Today: 330 / 2000 kcal"), "reply: {}", reply);

    let user = state.store.get_user_by_chat_key("chat-1").await.unwrap().unwrap();
    assert_eq!(state.chat.chat_calories_today(user.id).await.unwrap(), 330.0);

    // Both turns landed in the conversation log with the intent tag.
    let window = state
        .store
        .conversation_window(user.id, "2000-01-01T00:00:00Z", 50)
        .await
        .unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].intent.as_deref(), Some("log_food"));
}

#[tokio::test]
async fn query_includes_the_daily_summary() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    state
        .chat
        .handle_message("chat-1", "olena", "I ate 200g of chicken breast")
        .await
        .unwrap();

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "how am I doing today?")
        .await
        .unwrap();

    assert!(reply.contains("Here is your day so far."), "reply: {}", reply);
    assert!(reply.contains("Today: 330 / 2000 kcal"), "reply: {}", reply);
    assert!(reply.contains("Protein 62"), "reply: {}", reply);
}

#[tokio::test]
async fn delete_removes_the_latest_chat_entry_then_noops() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    state
        .chat
        .handle_message("chat-1", "olena", "I ate 200g of chicken breast")
        .await
        .unwrap();

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "delete that last one")
        .await
        .unwrap();
    assert!(reply.contains("Removed Chicken Breast"), "reply: {}", reply);
    assert!(reply.contains("Today: 0 / 2000 kcal"), "reply: {}", reply);

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "delete again please")
        .await
        .unwrap();
    assert!(reply.contains("nothing logged"), "reply: {}", reply);
}

#[tokio::test]
async fn calorie_goal_is_validated_and_applied() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "set my goal to 1800 kcal")
        .await
        .unwrap();
    assert!(reply.contains("Daily goal set to 1800 kcal."), "reply: {}", reply);

    let user = state.store.get_user_by_chat_key("chat-1").await.unwrap().unwrap();
    assert_eq!(user.daily_calorie_goal, 1800);

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "make my goal something silly")
        .await
        .unwrap();
    assert!(reply.contains("out of range"), "reply: {}", reply);

    let user = state.store.get_user_by_chat_key("chat-1").await.unwrap().unwrap();
    assert_eq!(user.daily_calorie_goal, 1800);
}

#[tokio::test]
async fn voice_messages_are_transcribed_then_handled() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_voice("chat-1", "olena", vec![0u8; 64])
        .await
        .unwrap();

    assert!(reply.contains("Chicken Breast"), "reply: {}", reply);
    assert!(reply.contains("330"), "reply: {}", reply);
}

/// Mock where the food database is down but the LLM works.
fn search_outage_router() -> Router {
    Router::new()
        .route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let last_user = body["messages"]
                    .as_array()
                    .and_then(|m| {
                        m.iter()
                            .rev()
                            .find(|msg| msg["role"] == "user")
                            .and_then(|msg| msg["content"].as_str())
                    })
                    .unwrap_or("");
                Json(serde_json::json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": classify_content(last_user)
                        }
                    }]
                }))
            }),
        )
        .route(
            "/connect/token",
            post(|| async {
                Json(serde_json::json!({
                    "access_token": "app-bearer",
                    "expires_in": 86400,
                    "token_type": "Bearer"
                }))
            }),
        )
        .route(
            "/rest/server.api",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
}

#[tokio::test]
async fn food_database_outage_still_yields_a_reply() {
    let base_url = common::spawn_mock(search_outage_router()).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "I ate 200g of chicken breast")
        .await
        .unwrap();
    assert!(
        reply.contains("couldn't log \"chicken breast\""),
        "reply: {}",
        reply
    );
    assert!(reply.contains("Today: 0 / 2000 kcal"), "reply: {}", reply);

    // Both turns still landed in the conversation log.
    let user = state.store.get_user_by_chat_key("chat-1").await.unwrap().unwrap();
    let window = state
        .store
        .conversation_window(user.id, "2000-01-01T00:00:00Z", 50)
        .await
        .unwrap();
    assert_eq!(window.len(), 2);
}

#[tokio::test]
async fn llm_outage_still_yields_a_reply() {
    // No /chat/completions route at all, so classification fails outright.
    let router = Router::new().route(
        "/connect/token",
        post(|| async {
            Json(serde_json::json!({
                "access_token": "app-bearer",
                "expires_in": 86400,
                "token_type": "Bearer"
            }))
        }),
    );
    let base_url = common::spawn_mock(router).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "good morning!")
        .await
        .unwrap();
    assert!(
        reply.contains("having trouble understanding"),
        "reply: {}",
        reply
    );
}

#[tokio::test]
async fn negative_quantity_is_skipped_not_errored() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "log impossible food")
        .await
        .unwrap();
    assert!(reply.contains("doesn't look right"), "reply: {}", reply);
    assert!(reply.contains("Today: 0 / 2000 kcal"), "reply: {}", reply);
}

#[tokio::test]
async fn query_never_fetches_the_diary() {
    let diary_calls = Arc::new(AtomicUsize::new(0));
    let counter = diary_calls.clone();

    let router = Router::new()
        .route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let last_user = body["messages"]
                    .as_array()
                    .and_then(|m| {
                        m.iter()
                            .rev()
                            .find(|msg| msg["role"] == "user")
                            .and_then(|msg| msg["content"].as_str())
                    })
                    .unwrap_or("");
                Json(serde_json::json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": classify_content(last_user)
                        }
                    }]
                }))
            }),
        )
        .route(
            "/rest/server.api",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let counter = counter.clone();
                async move {
                    if params.get("method").map(String::as_str) == Some("food_entries.get.v2") {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Json(serde_json::json!({"food_entries": null}))
                }
            }),
        );
    let base_url = common::spawn_mock(router).await;
    let state = common::test_state(&base_url).await;

    // Diary connected, so a live fetch would be possible.
    let user = state.store.get_or_create_user("chat-1", "olena").await.unwrap();
    let token = vitalog::models::OAuthToken {
        user_id: user.id,
        provider: vitalog::models::Provider::FatSecret.as_str().to_string(),
        access_token: "fs_at".to_string(),
        access_secret: Some("fs_secret".to_string()),
        refresh_token: None,
        expires_at: None,
    };
    state.store.save_token(&token).await.unwrap();

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "how am I doing today?")
        .await
        .unwrap();
    assert!(reply.contains("Today: 0 / 2000 kcal"), "reply: {}", reply);
    assert_eq!(diary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unclassifiable_chatter_gets_a_general_reply() {
    let base_url = common::spawn_mock(mock_router()).await;
    let state = common::test_state(&base_url).await;

    let reply = state
        .chat
        .handle_message("chat-1", "olena", "good morning!")
        .await
        .unwrap();
    assert_eq!(reply, "Hi there!");
}
