// SPDX-License-Identifier: MIT

//! Storage semantics: idempotent upserts by natural key, token replacement,
//! and chat-entry deletion.

mod common;

use std::str::FromStr;

use vitalog::models::{
    ExternalRecord, MealType, NutritionFacts, OAuthToken, Provider, RecordKind,
};

fn workout_record(user_id: i64, native_id: &str, calories: Option<f64>) -> ExternalRecord {
    ExternalRecord {
        provider: Provider::Whoop.as_str().to_string(),
        native_id: native_id.to_string(),
        user_id,
        kind: RecordKind::Workout.as_str().to_string(),
        started_at: "2025-03-01T06:00:00Z".to_string(),
        score_state: "PENDING_SCORE".to_string(),
        calories,
        strain: None,
        recovery_score: None,
        sleep_minutes: None,
        synced_at: "2025-03-01T08:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn external_record_upsert_is_idempotent() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    let record = workout_record(user.id, "w-1", None);
    store.upsert_external_record(&record).await.unwrap();
    store.upsert_external_record(&record).await.unwrap();

    let records = store
        .records_for_user(user.id, RecordKind::Workout, "2025-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].score_state, "PENDING_SCORE");
    assert!(records[0].calories.is_none());
}

#[tokio::test]
async fn resync_overwrites_score_but_not_identity() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    store
        .upsert_external_record(&workout_record(user.id, "w-1", None))
        .await
        .unwrap();

    // Provider scored the workout on a later pass.
    let mut rescored = workout_record(user.id, "w-1", Some(512.5));
    rescored.score_state = "SCORED".to_string();
    rescored.started_at = "2099-01-01T00:00:00Z".to_string(); // must be ignored
    store.upsert_external_record(&rescored).await.unwrap();

    let records = store
        .records_for_user(user.id, RecordKind::Workout, "2025-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].score_state, "SCORED");
    assert_eq!(records[0].calories, Some(512.5));
    assert_eq!(records[0].started_at, "2025-03-01T06:00:00Z");
}

#[tokio::test]
async fn saving_a_token_replaces_the_previous_one() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    let first = OAuthToken {
        user_id: user.id,
        provider: Provider::Whoop.as_str().to_string(),
        access_token: "at-1".to_string(),
        access_secret: None,
        refresh_token: Some("rt-1".to_string()),
        expires_at: Some(chrono::Utc::now()),
    };
    store.save_token(&first).await.unwrap();

    let mut second = first.clone();
    second.access_token = "at-2".to_string();
    second.refresh_token = Some("rt-2".to_string());
    store.save_token(&second).await.unwrap();

    let stored = store
        .get_token(user.id, Provider::Whoop)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "at-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("rt-2"));

    // Still exactly one user on the worklist.
    let users = store.users_with_token(Provider::Whoop).await.unwrap();
    assert_eq!(users.len(), 1);

    store.delete_token(user.id, Provider::Whoop).await.unwrap();
    assert!(store.get_token(user.id, Provider::Whoop).await.unwrap().is_none());
}

#[tokio::test]
async fn diary_upsert_never_touches_chat_entries() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    let facts = NutritionFacts {
        serving_size: 200.0,
        calories: 330.0,
        protein: 62.0,
        fat: 7.2,
        carbs: 0.0,
    };
    store
        .insert_chat_entry(user.id, "Chicken Breast", &facts, 200.0, MealType::Lunch)
        .await
        .unwrap();

    // Same food imported from the diary twice must stay one diary row.
    store
        .upsert_diary_entry(
            user.id,
            "fs-100",
            "Chicken Breast",
            &facts,
            200.0,
            "g",
            "lunch",
            "2025-03-01T12:00:00Z",
        )
        .await
        .unwrap();
    store
        .upsert_diary_entry(
            user.id,
            "fs-100",
            "Chicken Breast (grilled)",
            &facts,
            200.0,
            "g",
            "lunch",
            "2025-03-01T12:00:00Z",
        )
        .await
        .unwrap();

    let entries = store
        .food_entries_since(user.id, "2025-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);

    let chat: Vec<_> = entries.iter().filter(|e| e.source == "chat").collect();
    let diary: Vec<_> = entries.iter().filter(|e| e.source == "diary").collect();
    assert_eq!(chat.len(), 1);
    assert_eq!(diary.len(), 1);
    assert_eq!(diary[0].name, "Chicken Breast (grilled)");
}

#[tokio::test]
async fn delete_latest_chat_entry_skips_diary_rows() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    let facts = NutritionFacts {
        serving_size: 100.0,
        calories: 155.0,
        protein: 13.0,
        fat: 11.0,
        carbs: 1.1,
    };
    store
        .insert_chat_entry(user.id, "Egg", &facts, 100.0, MealType::Breakfast)
        .await
        .unwrap();
    store
        .upsert_diary_entry(
            user.id,
            "fs-200",
            "Oatmeal",
            &facts,
            100.0,
            "g",
            "breakfast",
            "2099-01-01T00:00:00Z",
        )
        .await
        .unwrap();

    // The diary row is newer but must not be deleted.
    let deleted = store.delete_latest_chat_entry(user.id).await.unwrap();
    assert_eq!(deleted, Some(("Egg".to_string(), 155.0)));

    let again = store.delete_latest_chat_entry(user.id).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn calorie_sums_are_zero_with_no_rows() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    // A brand-new user has nothing logged yet; both sums must decode as 0.0
    // rather than erroring on the integer the empty SUM coalesces to.
    let burned = store
        .sum_workout_calories(user.id, "2025-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(burned, 0.0);

    let eaten = store
        .sum_food_calories(user.id, "2025-01-01T00:00:00Z", None)
        .await
        .unwrap();
    assert_eq!(eaten, 0.0);

    let chat_only = store
        .sum_food_calories(
            user.id,
            "2025-01-01T00:00:00Z",
            Some(vitalog::models::FoodSource::Chat),
        )
        .await
        .unwrap();
    assert_eq!(chat_only, 0.0);
}

#[tokio::test]
async fn calorie_goal_updates_and_kind_roundtrips() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();
    assert_eq!(user.calorie_goal(), 2000);

    store.set_calorie_goal(user.id, 1800).await.unwrap();
    let updated = store.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(updated.daily_calorie_goal, 1800);

    assert_eq!(
        RecordKind::from_str("sleep_session").unwrap(),
        RecordKind::SleepSession
    );
}
