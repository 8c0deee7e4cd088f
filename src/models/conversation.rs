// SPDX-License-Identifier: MIT

//! Conversation log model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in the append-only conversation log. Retained only within the
/// rolling horizon; older rows are purged by the cleanup job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationMessage {
    pub id: i64,
    pub user_id: i64,
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
    /// Classified intent of the turn, set on assistant rows.
    pub intent: Option<String>,
    /// RFC 3339.
    pub created_at: String,
}
