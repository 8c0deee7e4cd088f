// SPDX-License-Identifier: MIT

//! Sync engine cycles against a mock provider: normalization, idempotent
//! re-runs, and diary import.

mod common;

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;

use vitalog::models::{OAuthToken, Provider, RecordKind};

fn whoop_router() -> Router {
    Router::new()
        .route(
            "/activity/workout",
            get(|| async {
                Json(serde_json::json!({
                    "records": [{
                        "id": "w-1",
                        "start": "2025-03-01T06:00:00Z",
                        "score_state": "SCORED",
                        "score": {"strain": 14.2, "kilojoule": 1255.2}
                    }],
                    "next_token": null
                }))
            }),
        )
        .route(
            "/recovery",
            get(|| async {
                Json(serde_json::json!({
                    "records": [{
                        "cycle_id": 555,
                        "created_at": "2025-03-01T07:00:00Z",
                        "score_state": "SCORED",
                        "score": {"recovery_score": 67.0}
                    }],
                    "next_token": null
                }))
            }),
        )
        .route(
            "/activity/sleep",
            get(|| async {
                Json(serde_json::json!({
                    "records": [{
                        "id": "s-1",
                        "start": "2025-02-28T22:30:00Z",
                        "score_state": "SCORED",
                        "score": {"stage_summary": {
                            "total_in_bed_time_milli": 28800000.0,
                            "total_awake_time_milli": 1800000.0
                        }}
                    }],
                    "next_token": null
                }))
            }),
        )
}

async fn seed_whoop_token(store: &vitalog::db::Store, user_id: i64) {
    store
        .save_token(&OAuthToken {
            user_id,
            provider: Provider::Whoop.as_str().to_string(),
            access_token: "at".to_string(),
            access_secret: None,
            refresh_token: Some("rt".to_string()),
            expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn wearable_cycle_normalizes_and_is_idempotent() {
    let base_url = common::spawn_mock(whoop_router()).await;
    let state = common::test_state(&base_url).await;

    let user = state.store.get_or_create_user("chat-1", "olena").await.unwrap();
    seed_whoop_token(&state.store, user.id).await;

    let first = state.sync.run_whoop_cycle().await.unwrap();
    assert_eq!(first.users, 1);
    assert_eq!(first.records, 3);
    assert_eq!(first.failed_users, 0);

    // Re-running the same window must not duplicate anything.
    let second = state.sync.run_whoop_cycle().await.unwrap();
    assert_eq!(second.records, 3);

    let since = "2025-01-01T00:00:00Z";
    let workouts = state
        .store
        .records_for_user(user.id, RecordKind::Workout, since)
        .await
        .unwrap();
    assert_eq!(workouts.len(), 1);
    assert!((workouts[0].calories.unwrap() - 300.0).abs() < 0.1);
    assert_eq!(workouts[0].strain, Some(14.2));

    let recoveries = state
        .store
        .records_for_user(user.id, RecordKind::RecoveryCycle, since)
        .await
        .unwrap();
    assert_eq!(recoveries.len(), 1);
    assert_eq!(recoveries[0].native_id, "recovery-555");
    assert_eq!(recoveries[0].recovery_score, Some(67.0));

    let sleeps = state
        .store
        .records_for_user(user.id, RecordKind::SleepSession, since)
        .await
        .unwrap();
    assert_eq!(sleeps.len(), 1);
    assert_eq!(sleeps[0].sleep_minutes, Some(450.0));
}

#[tokio::test]
async fn user_without_a_token_is_skipped() {
    let base_url = common::spawn_mock(whoop_router()).await;
    let state = common::test_state(&base_url).await;

    state.store.get_or_create_user("chat-1", "olena").await.unwrap();

    let outcome = state.sync.run_whoop_cycle().await.unwrap();
    assert_eq!(outcome.users, 0);
    assert_eq!(outcome.records, 0);
}

/// Dispatches the platform's single REST endpoint by its `method` param.
fn fatsecret_router() -> Router {
    Router::new().route(
        "/rest/server.api",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            match params.get("method").map(String::as_str) {
                Some("food_entries.get.v2") => Json(serde_json::json!({
                    "food_entries": {
                        "food_entry": {
                            "food_entry_id": "fe-1",
                            "food_entry_name": "Oatmeal",
                            "calories": "389",
                            "protein": "16.9",
                            "fat": "6.9",
                            "carbohydrate": "66.3",
                            "number_of_units": "1.000",
                            "meal": "breakfast",
                            "date_int": "20148"
                        }
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
async fn diary_cycle_imports_entries_once() {
    let base_url = common::spawn_mock(fatsecret_router()).await;
    let state = common::test_state(&base_url).await;

    let user = state.store.get_or_create_user("chat-1", "olena").await.unwrap();
    state
        .store
        .save_token(&OAuthToken {
            user_id: user.id,
            provider: Provider::FatSecret.as_str().to_string(),
            access_token: "fs-at".to_string(),
            access_secret: Some("fs-secret".to_string()),
            refresh_token: None,
            expires_at: None,
        })
        .await
        .unwrap();

    let first = state.sync.run_diary_cycle().await.unwrap();
    assert_eq!(first.records, 1);
    let second = state.sync.run_diary_cycle().await.unwrap();
    assert_eq!(second.records, 1);

    // One external record and one diary-sourced food entry, despite two runs.
    let records = state
        .store
        .records_for_user(user.id, RecordKind::DiaryEntry, "2025-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].native_id, "fe-1");
    assert_eq!(records[0].calories, Some(389.0));

    let entries = state
        .store
        .food_entries_since(user.id, "2025-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, "diary");
    assert_eq!(entries[0].provider_entry_id.as_deref(), Some("fe-1"));
    assert_eq!(entries[0].name, "Oatmeal");
}
