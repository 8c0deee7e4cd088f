// SPDX-License-Identifier: MIT

//! Conversation window and retention semantics.

mod common;

use vitalog::models::Role;

#[tokio::test]
async fn window_keeps_the_newest_messages_oldest_first() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    for i in 1..=60 {
        store
            .append_message(user.id, Role::User, &format!("msg-{}", i), None)
            .await
            .unwrap();
    }

    let window = store
        .conversation_window(user.id, "2000-01-01T00:00:00Z", 50)
        .await
        .unwrap();

    assert_eq!(window.len(), 50);
    // The 10 oldest messages fall off; order is oldest-first.
    assert_eq!(window.first().unwrap().content, "msg-11");
    assert_eq!(window.last().unwrap().content, "msg-60");
}

#[tokio::test]
async fn window_excludes_messages_outside_the_horizon() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    store
        .append_message(user.id, Role::User, "hello", None)
        .await
        .unwrap();

    // Horizon in the future: nothing qualifies.
    let future = vitalog::time_utils::format_utc_rfc3339(
        chrono::Utc::now() + chrono::Duration::hours(1),
    );
    let window = store.conversation_window(user.id, &future, 50).await.unwrap();
    assert!(window.is_empty());
}

#[tokio::test]
async fn purge_removes_only_old_messages() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    store
        .append_message(user.id, Role::User, "keep me", Some("general"))
        .await
        .unwrap();

    // Cutoff before any message exists: nothing purged.
    let purged = store
        .purge_conversations("2000-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(purged, 0);

    // Cutoff after now: everything goes.
    let future = vitalog::time_utils::format_utc_rfc3339(
        chrono::Utc::now() + chrono::Duration::hours(1),
    );
    let purged = store.purge_conversations(&future).await.unwrap();
    assert_eq!(purged, 1);

    let window = store
        .conversation_window(user.id, "2000-01-01T00:00:00Z", 50)
        .await
        .unwrap();
    assert!(window.is_empty());
}

#[tokio::test]
async fn roles_and_intents_are_stored() {
    let store = common::store_only().await;
    let user = store.get_or_create_user("chat-1", "olena").await.unwrap();

    store
        .append_message(user.id, Role::User, "i ate an egg", Some("log_food"))
        .await
        .unwrap();
    store
        .append_message(user.id, Role::Assistant, "Logged Egg", Some("log_food"))
        .await
        .unwrap();

    let window = store
        .conversation_window(user.id, "2000-01-01T00:00:00Z", 50)
        .await
        .unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].role, "user");
    assert_eq!(window[1].role, "assistant");
    assert_eq!(window[1].intent.as_deref(), Some("log_food"));
}
