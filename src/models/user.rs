// SPDX-License-Identifier: MIT

//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// A user of the assistant. Owns tokens, food entries, external records and
/// conversation messages by reference; none of those point back.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Internal user id (primary key).
    pub id: i64,
    /// Stable key assigned by the messaging transport (chat id).
    pub chat_key: String,
    /// Display name from the transport, if any.
    pub username: String,
    /// Daily calorie goal in kcal.
    pub daily_calorie_goal: i64,
    /// IANA timezone name used for "today" boundaries and meal-type hints.
    pub timezone: String,
    /// Reply language hint ("uk" or "en").
    pub locale: String,
    /// When the user first contacted the bot (RFC 3339).
    pub created_at: String,
}

impl User {
    /// Calorie goal with the default applied for legacy rows.
    pub fn calorie_goal(&self) -> i64 {
        if self.daily_calorie_goal > 0 {
            self.daily_calorie_goal
        } else {
            2000
        }
    }
}
