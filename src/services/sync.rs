// SPDX-License-Identifier: MIT

//! Periodic multi-source sync engine.
//!
//! Each cycle walks every user holding a credential for the provider,
//! fetches a lookback window of records, normalizes them and upserts by
//! natural key. One user's failure never stops the rest; transient
//! provider errors are retried with linear backoff inside a user's pass.

use futures_util::{stream, StreamExt};
use std::future::Future;
use std::time::Duration as StdDuration;

use crate::db::Store;
use crate::error::AppError;
use crate::models::{ExternalRecord, Provider, RecordKind, User};
use crate::services::whoop::{WhoopRecovery, WhoopSleep, WhoopWorkout};
use crate::services::{FatSecretService, TokenVault, WhoopService};
use crate::time_utils;

/// Concurrent per-user syncs per cycle.
const SYNC_CONCURRENCY: usize = 4;

/// Wearable lookback window. Wide enough to catch records the provider
/// re-scored after our last pass.
const WEARABLE_LOOKBACK_HOURS: i64 = 48;

/// Retries for a transient provider failure within one user's pass.
const TRANSIENT_ATTEMPTS: u32 = 3;

/// What one sync cycle did.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    pub users: usize,
    pub records: usize,
    pub failed_users: usize,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Store,
    vault: TokenVault,
    whoop: WhoopService,
    fatsecret: FatSecretService,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        vault: TokenVault,
        whoop: WhoopService,
        fatsecret: FatSecretService,
    ) -> Self {
        Self {
            store,
            vault,
            whoop,
            fatsecret,
        }
    }

    // ─── Wearable Cycle ──────────────────────────────────────────

    /// Sync workouts, recoveries and sleep for every connected user.
    pub async fn run_whoop_cycle(&self) -> Result<SyncOutcome, AppError> {
        let users = self.vault.users_with_token(Provider::Whoop).await?;
        let total = users.len();
        tracing::info!(users = total, "Starting wearable sync cycle");

        let results: Vec<Result<usize, AppError>> = stream::iter(users)
            .map(|user| {
                let engine = self.clone();
                async move {
                    let user_id = user.id;
                    engine.sync_whoop_user(&user).await.map_err(|e| {
                        tracing::warn!(user_id, error = %e, "Wearable sync failed for user");
                        e
                    })
                }
            })
            .buffer_unordered(SYNC_CONCURRENCY)
            .collect()
            .await;

        let outcome = summarize(total, &results);
        tracing::info!(
            users = outcome.users,
            records = outcome.records,
            failed_users = outcome.failed_users,
            "Wearable sync cycle complete"
        );
        Ok(outcome)
    }

    async fn sync_whoop_user(&self, user: &User) -> Result<usize, AppError> {
        let now = chrono::Utc::now();
        let since = time_utils::hours_ago(now, WEARABLE_LOOKBACK_HOURS);
        let synced_at = time_utils::format_utc_rfc3339(now);

        let workouts = retry_transient(|| self.whoop.list_workouts(user.id, &since)).await?;
        let recoveries = retry_transient(|| self.whoop.list_recoveries(user.id, &since)).await?;
        let sleeps = retry_transient(|| self.whoop.list_sleeps(user.id, &since)).await?;

        let mut count = 0;
        for workout in &workouts {
            self.store
                .upsert_external_record(&normalize_workout(workout, user.id, &synced_at))
                .await?;
            count += 1;
        }
        for recovery in &recoveries {
            self.store
                .upsert_external_record(&normalize_recovery(recovery, user.id, &synced_at))
                .await?;
            count += 1;
        }
        for sleep in &sleeps {
            self.store
                .upsert_external_record(&normalize_sleep(sleep, user.id, &synced_at))
                .await?;
            count += 1;
        }

        tracing::debug!(user_id = user.id, records = count, "Wearable user synced");
        Ok(count)
    }

    // ─── Diary Cycle ─────────────────────────────────────────────

    /// Import yesterday's and today's diary for every connected user. Each
    /// entry lands twice: as an external record (provenance) and as a
    /// diary-sourced food entry (aggregation). Chat-logged entries are
    /// never touched.
    pub async fn run_diary_cycle(&self) -> Result<SyncOutcome, AppError> {
        let users = self.vault.users_with_token(Provider::FatSecret).await?;
        let total = users.len();
        tracing::info!(users = total, "Starting diary sync cycle");

        let results: Vec<Result<usize, AppError>> = stream::iter(users)
            .map(|user| {
                let engine = self.clone();
                async move {
                    let user_id = user.id;
                    engine.sync_diary_user(&user).await.map_err(|e| {
                        tracing::warn!(user_id, error = %e, "Diary sync failed for user");
                        e
                    })
                }
            })
            .buffer_unordered(SYNC_CONCURRENCY)
            .collect()
            .await;

        let outcome = summarize(total, &results);
        tracing::info!(
            users = outcome.users,
            records = outcome.records,
            failed_users = outcome.failed_users,
            "Diary sync cycle complete"
        );
        Ok(outcome)
    }

    async fn sync_diary_user(&self, user: &User) -> Result<usize, AppError> {
        let now = chrono::Utc::now();
        let today = now.date_naive();
        let synced_at = time_utils::format_utc_rfc3339(now);

        // Yesterday is fetched too so entries made between the previous
        // cycle and midnight are still picked up; the upsert keeps the
        // overlap idempotent.
        let yesterday = today - chrono::Duration::days(1);
        let mut entries =
            retry_transient(|| self.fatsecret.diary_entries(user.id, yesterday)).await?;
        entries.extend(retry_transient(|| self.fatsecret.diary_entries(user.id, today)).await?);

        let mut count = 0;
        for entry in &entries {
            let record = entry.to_external_record(user.id, &synced_at);
            self.store.upsert_external_record(&record).await?;

            let facts = entry.nutrition_facts();
            let meal = entry.meal.as_deref().unwrap_or("other");
            self.store
                .upsert_diary_entry(
                    user.id,
                    &entry.food_entry_id,
                    &entry.food_entry_name,
                    &facts,
                    facts.serving_size,
                    "serving",
                    meal,
                    &record.started_at,
                )
                .await?;
            count += 1;
        }

        tracing::debug!(user_id = user.id, entries = count, "Diary user synced");
        Ok(count)
    }
}

fn summarize(total: usize, results: &[Result<usize, AppError>]) -> SyncOutcome {
    let mut outcome = SyncOutcome {
        users: total,
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(count) => outcome.records += count,
            Err(_) => outcome.failed_users += 1,
        }
    }
    outcome
}

/// Retry transient failures (5xx, timeouts, 429) with exponential backoff
/// (1s, 2s, 4s, ...). Anything else propagates immediately.
async fn retry_transient<T, F, Fut>(mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut last_err = None;
    for attempt in 1..=TRANSIENT_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < TRANSIENT_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "Transient provider error, retrying");
                tokio::time::sleep(StdDuration::from_secs(1 << (attempt - 1))).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::Provider("retries exhausted".to_string())))
}

fn normalize_workout(workout: &WhoopWorkout, user_id: i64, synced_at: &str) -> ExternalRecord {
    ExternalRecord {
        provider: Provider::Whoop.as_str().to_string(),
        native_id: workout.id.clone(),
        user_id,
        kind: RecordKind::Workout.as_str().to_string(),
        started_at: workout.start.clone(),
        score_state: workout.score_state.clone(),
        calories: workout.calories(),
        strain: workout.score.as_ref().and_then(|s| s.strain),
        recovery_score: None,
        sleep_minutes: None,
        synced_at: synced_at.to_string(),
    }
}

fn normalize_recovery(recovery: &WhoopRecovery, user_id: i64, synced_at: &str) -> ExternalRecord {
    ExternalRecord {
        provider: Provider::Whoop.as_str().to_string(),
        native_id: format!("recovery-{}", recovery.cycle_id),
        user_id,
        kind: RecordKind::RecoveryCycle.as_str().to_string(),
        started_at: recovery.created_at.clone(),
        score_state: recovery.score_state.clone(),
        calories: None,
        strain: None,
        recovery_score: recovery.score.as_ref().and_then(|s| s.recovery_score),
        sleep_minutes: None,
        synced_at: synced_at.to_string(),
    }
}

fn normalize_sleep(sleep: &WhoopSleep, user_id: i64, synced_at: &str) -> ExternalRecord {
    ExternalRecord {
        provider: Provider::Whoop.as_str().to_string(),
        native_id: sleep.id.clone(),
        user_id,
        kind: RecordKind::SleepSession.as_str().to_string(),
        started_at: sleep.start.clone(),
        score_state: sleep.score_state.clone(),
        calories: None,
        strain: None,
        recovery_score: None,
        sleep_minutes: sleep.sleep_minutes(),
        synced_at: synced_at.to_string(),
    }
}
