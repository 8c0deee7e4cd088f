// SPDX-License-Identifier: MIT

//! Normalized external record model.
//!
//! One row per provider record, keyed by (provider, native_id). Identity
//! columns never change after insert; score columns may be overwritten by
//! later syncs (providers re-score records after the fact).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of provider record this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Workout,
    RecoveryCycle,
    SleepSession,
    DiaryEntry,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Workout => "workout",
            RecordKind::RecoveryCycle => "recovery_cycle",
            RecordKind::SleepSession => "sleep_session",
            RecordKind::DiaryEntry => "diary_entry",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workout" => Ok(RecordKind::Workout),
            "recovery_cycle" => Ok(RecordKind::RecoveryCycle),
            "sleep_session" => Ok(RecordKind::SleepSession),
            "diary_entry" => Ok(RecordKind::DiaryEntry),
            other => Err(format!("unknown record kind: {}", other)),
        }
    }
}

/// A normalized provider record, as stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExternalRecord {
    /// Provider tag ("whoop" / "fatsecret").
    pub provider: String,
    /// The provider's stable identifier for this record (natural key).
    pub native_id: String,
    /// Owning user.
    pub user_id: i64,
    /// Record kind, stored as text.
    pub kind: String,
    /// When the underlying activity started (RFC 3339).
    pub started_at: String,
    /// Provider scoring state (SCORED, PENDING_SCORE, UNSCORABLE, ...).
    pub score_state: String,
    /// Energy, kcal. Burned for workouts, consumed for diary entries.
    pub calories: Option<f64>,
    /// Workout strain score.
    pub strain: Option<f64>,
    /// Recovery score percentage.
    pub recovery_score: Option<f64>,
    /// Actual sleep time in minutes (in-bed minus awake).
    pub sleep_minutes: Option<f64>,
    /// Last time a sync wrote this row (RFC 3339).
    pub synced_at: String,
}
