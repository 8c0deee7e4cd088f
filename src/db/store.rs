// SPDX-License-Identifier: MIT

//! SQLite store with typed operations.
//!
//! Provides high-level operations for:
//! - Users (identity, calorie goal)
//! - OAuth tokens (the token vault's backing rows)
//! - External records (normalized provider data, upsert by natural key)
//! - Food entries (chat-logged and diary-imported)
//! - Conversation messages (bounded window + retention purge)

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{
    ConversationMessage, ExternalRecord, FoodEntry, FoodSource, MealType, OAuthToken, Provider,
    RecordKind, Role, User,
};

/// SQLite-backed store shared across services.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the database at `url`, creating the file if missing.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect: {}", e)))?;

        tracing::info!(url, "Connected to SQLite");
        Ok(Self { pool })
    }

    /// In-memory store for tests. Single connection so all queries see the
    /// same database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::Database(format!("Failed to open memory db: {}", e)))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create all tables and indexes if they don't exist.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_key TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL DEFAULT '',
                daily_calorie_goal INTEGER NOT NULL DEFAULT 2000,
                timezone TEXT NOT NULL DEFAULT 'Europe/Kyiv',
                locale TEXT NOT NULL DEFAULT 'uk',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                user_id INTEGER NOT NULL REFERENCES users(id),
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                access_secret TEXT,
                refresh_token TEXT,
                expires_at TEXT,
                UNIQUE(user_id, provider)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS external_records (
                provider TEXT NOT NULL,
                native_id TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                started_at TEXT NOT NULL,
                score_state TEXT NOT NULL,
                calories REAL,
                strain REAL,
                recovery_score REAL,
                sleep_minutes REAL,
                synced_at TEXT NOT NULL,
                UNIQUE(provider, native_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS food_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                calories REAL NOT NULL DEFAULT 0 CHECK (calories >= 0),
                protein REAL NOT NULL DEFAULT 0 CHECK (protein >= 0),
                fat REAL NOT NULL DEFAULT 0 CHECK (fat >= 0),
                carbs REAL NOT NULL DEFAULT 0 CHECK (carbs >= 0),
                serving_size REAL NOT NULL DEFAULT 0,
                serving_unit TEXT NOT NULL DEFAULT 'g',
                meal_type TEXT NOT NULL DEFAULT 'snack',
                source TEXT NOT NULL DEFAULT 'chat',
                provider_entry_id TEXT,
                logged_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Natural-key index for diary-imported rows. Chat rows have NULL
        // provider_entry_id and are exempt.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_food_entries_provider_entry
            ON food_entries(provider_entry_id)
            WHERE provider_entry_id IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                intent TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_conversation_user_created
            ON conversation_messages(user_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_food_entries_user_logged
            ON food_entries(user_id, logged_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database migration complete");
        Ok(())
    }

    fn now() -> String {
        crate::time_utils::format_utc_rfc3339(chrono::Utc::now())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by the transport's chat key, creating one on first contact.
    pub async fn get_or_create_user(
        &self,
        chat_key: &str,
        username: &str,
    ) -> Result<User, AppError> {
        if let Some(user) = self.get_user_by_chat_key(chat_key).await? {
            return Ok(user);
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (chat_key, username, created_at)
            VALUES (?, ?, ?)
            RETURNING id, chat_key, username, daily_calorie_goal, timezone, locale, created_at
            "#,
        )
        .bind(chat_key)
        .bind(username)
        .bind(Self::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = user.id, chat_key, "Created new user");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, chat_key, username, daily_calorie_goal, timezone, locale, created_at \
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_chat_key(&self, chat_key: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, chat_key, username, daily_calorie_goal, timezone, locale, created_at \
             FROM users WHERE chat_key = ?",
        )
        .bind(chat_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn set_calorie_goal(&self, user_id: i64, goal: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET daily_calorie_goal = ? WHERE id = ?")
            .bind(goal)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get the stored credential for a (user, provider), if any.
    pub async fn get_token(
        &self,
        user_id: i64,
        provider: Provider,
    ) -> Result<Option<OAuthToken>, AppError> {
        let token = sqlx::query_as::<_, OAuthToken>(
            "SELECT user_id, provider, access_token, access_secret, refresh_token, expires_at \
             FROM oauth_tokens WHERE user_id = ? AND provider = ?",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    /// Store a credential, replacing any existing row for the same
    /// (user, provider). Enforces the at-most-one-live-token invariant.
    pub async fn save_token(&self, token: &OAuthToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_tokens
                (user_id, provider, access_token, access_secret, refresh_token, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                access_secret = excluded.access_secret,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.provider)
        .bind(&token.access_token)
        .bind(&token.access_secret)
        .bind(&token.refresh_token)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a credential (revocation clears, never merely flags).
    pub async fn delete_token(&self, user_id: i64, provider: Provider) -> Result<(), AppError> {
        sqlx::query("DELETE FROM oauth_tokens WHERE user_id = ? AND provider = ?")
            .bind(user_id)
            .bind(provider.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Users holding any credential for the given provider (the sync
    /// engine's worklist).
    pub async fn users_with_token(&self, provider: Provider) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.chat_key, u.username, u.daily_calorie_goal,
                   u.timezone, u.locale, u.created_at
            FROM users u
            JOIN oauth_tokens t ON t.user_id = u.id
            WHERE t.provider = ?
            ORDER BY u.id
            "#,
        )
        .bind(provider.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Tokens for `provider` whose expiry falls before `cutoff` (RFC 3339).
    /// Used by the proactive refresh job.
    pub async fn tokens_expiring_before(
        &self,
        provider: Provider,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<OAuthToken>, AppError> {
        let tokens = sqlx::query_as::<_, OAuthToken>(
            "SELECT user_id, provider, access_token, access_secret, refresh_token, expires_at \
             FROM oauth_tokens \
             WHERE provider = ? AND refresh_token IS NOT NULL AND expires_at IS NOT NULL \
               AND expires_at < ?",
        )
        .bind(provider.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    // ─── External Record Operations ──────────────────────────────

    /// Insert-or-update a normalized provider record by its natural key.
    /// Identity columns (user, kind, started_at) are written only on insert;
    /// score columns are overwritten so later re-scores win.
    pub async fn upsert_external_record(&self, record: &ExternalRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO external_records
                (provider, native_id, user_id, kind, started_at, score_state,
                 calories, strain, recovery_score, sleep_minutes, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider, native_id) DO UPDATE SET
                score_state = excluded.score_state,
                calories = excluded.calories,
                strain = excluded.strain,
                recovery_score = excluded.recovery_score,
                sleep_minutes = excluded.sleep_minutes,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&record.provider)
        .bind(&record.native_id)
        .bind(record.user_id)
        .bind(&record.kind)
        .bind(&record.started_at)
        .bind(&record.score_state)
        .bind(record.calories)
        .bind(record.strain)
        .bind(record.recovery_score)
        .bind(record.sleep_minutes)
        .bind(&record.synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records of one kind for a user, started at or after `since`
    /// (RFC 3339), newest first.
    pub async fn records_for_user(
        &self,
        user_id: i64,
        kind: RecordKind,
        since: &str,
    ) -> Result<Vec<ExternalRecord>, AppError> {
        let records = sqlx::query_as::<_, ExternalRecord>(
            "SELECT provider, native_id, user_id, kind, started_at, score_state, \
                    calories, strain, recovery_score, sleep_minutes, synced_at \
             FROM external_records \
             WHERE user_id = ? AND kind = ? AND started_at >= ? \
             ORDER BY started_at DESC",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Total workout calories burned since `since` (RFC 3339).
    pub async fn sum_workout_calories(&self, user_id: i64, since: &str) -> Result<f64, AppError> {
        // The empty SUM coalesces to INTEGER 0, which SQLite won't decode
        // as f64 without the CAST.
        let total: f64 = sqlx::query_scalar(
            "SELECT CAST(COALESCE(SUM(calories), 0) AS REAL) FROM external_records \
             WHERE user_id = ? AND kind = ? AND started_at >= ?",
        )
        .bind(user_id)
        .bind(RecordKind::Workout.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    // ─── Food Entry Operations ───────────────────────────────────

    /// Store a conversationally-logged entry.
    pub async fn insert_chat_entry(
        &self,
        user_id: i64,
        name: &str,
        facts: &crate::models::NutritionFacts,
        quantity_g: f64,
        meal_type: MealType,
    ) -> Result<i64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO food_entries
                (user_id, name, calories, protein, fat, carbs,
                 serving_size, serving_unit, meal_type, source, logged_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'g', ?, 'chat', ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(facts.calories)
        .bind(facts.protein)
        .bind(facts.fat)
        .bind(facts.carbs)
        .bind(quantity_g)
        .bind(meal_type.as_str())
        .bind(Self::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert-or-update a diary-imported entry by the provider's native
    /// entry id. Chat-logged rows carry no native id and are never touched.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_diary_entry(
        &self,
        user_id: i64,
        provider_entry_id: &str,
        name: &str,
        facts: &crate::models::NutritionFacts,
        serving_size: f64,
        serving_unit: &str,
        meal_type: &str,
        logged_at: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO food_entries
                (user_id, name, calories, protein, fat, carbs,
                 serving_size, serving_unit, meal_type, source, provider_entry_id, logged_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'diary', ?, ?)
            ON CONFLICT(provider_entry_id) WHERE provider_entry_id IS NOT NULL DO UPDATE SET
                name = excluded.name,
                calories = excluded.calories,
                protein = excluded.protein,
                fat = excluded.fat,
                carbs = excluded.carbs,
                serving_size = excluded.serving_size,
                serving_unit = excluded.serving_unit,
                meal_type = excluded.meal_type
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(facts.calories)
        .bind(facts.protein)
        .bind(facts.fat)
        .bind(facts.carbs)
        .bind(serving_size)
        .bind(serving_unit)
        .bind(meal_type)
        .bind(provider_entry_id)
        .bind(logged_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the newest chat-logged entry for the user. Returns the deleted
    /// entry's name and calories, or None if there was nothing to delete.
    pub async fn delete_latest_chat_entry(
        &self,
        user_id: i64,
    ) -> Result<Option<(String, f64)>, AppError> {
        let deleted: Option<(String, f64)> = sqlx::query_as(
            r#"
            DELETE FROM food_entries
            WHERE id = (
                SELECT id FROM food_entries
                WHERE user_id = ? AND source = 'chat'
                ORDER BY logged_at DESC, id DESC
                LIMIT 1
            )
            RETURNING name, calories
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deleted)
    }

    /// Food entries logged at or after `since` (RFC 3339), oldest first.
    pub async fn food_entries_since(
        &self,
        user_id: i64,
        since: &str,
    ) -> Result<Vec<FoodEntry>, AppError> {
        let entries = sqlx::query_as::<_, FoodEntry>(
            "SELECT id, user_id, name, calories, protein, fat, carbs, serving_size, \
                    serving_unit, meal_type, source, provider_entry_id, logged_at \
             FROM food_entries \
             WHERE user_id = ? AND logged_at >= ? \
             ORDER BY logged_at ASC, id ASC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Total calories eaten since `since`, optionally restricted to one
    /// provenance.
    pub async fn sum_food_calories(
        &self,
        user_id: i64,
        since: &str,
        source: Option<FoodSource>,
    ) -> Result<f64, AppError> {
        let total: f64 = match source {
            Some(source) => {
                sqlx::query_scalar(
                    "SELECT CAST(COALESCE(SUM(calories), 0) AS REAL) FROM food_entries \
                     WHERE user_id = ? AND logged_at >= ? AND source = ?",
                )
                .bind(user_id)
                .bind(since)
                .bind(source.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT CAST(COALESCE(SUM(calories), 0) AS REAL) FROM food_entries \
                     WHERE user_id = ? AND logged_at >= ?",
                )
                .bind(user_id)
                .bind(since)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(total)
    }

    // ─── Conversation Operations ─────────────────────────────────

    /// Append one turn to the conversation log.
    pub async fn append_message(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
        intent: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO conversation_messages (user_id, role, content, intent, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(intent)
        .bind(Self::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The bounded context window: the newest `cap` messages since `since`
    /// (RFC 3339), returned oldest first.
    pub async fn conversation_window(
        &self,
        user_id: i64,
        since: &str,
        cap: i64,
    ) -> Result<Vec<ConversationMessage>, AppError> {
        let messages = sqlx::query_as::<_, ConversationMessage>(
            r#"
            SELECT id, user_id, role, content, intent, created_at FROM (
                SELECT id, user_id, role, content, intent, created_at
                FROM conversation_messages
                WHERE user_id = ? AND created_at > ?
                ORDER BY created_at DESC, id DESC
                LIMIT ?
            ) ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(cap)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Delete messages older than `before` (RFC 3339). Returns the number of
    /// rows removed. Runs from the retention job only, never on reads.
    pub async fn purge_conversations(&self, before: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM conversation_messages WHERE created_at < ?")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
