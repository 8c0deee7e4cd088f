// SPDX-License-Identifier: MIT

//! Conversation orchestration: classify each message, dispatch to the
//! matching handler, and keep the conversation log current.

use chrono::{Timelike, Utc};

use crate::db::Store;
use crate::error::AppError;
use crate::models::{FoodSource, MealType, NutritionFacts, Role, User};
use crate::services::assistant::{ClassifiedIntent, FoodItem, IntentKind, OpenAiClient};
use crate::services::fatsecret::{parse_food_description, pick_gram_serving, FatSecretService};
use crate::time_utils;

/// Conversation window: newest 50 messages from the last 24 hours.
const WINDOW_HOURS: i64 = 24;
const WINDOW_CAP: i64 = 50;

/// Allowed daily calorie goal bounds, kcal.
const GOAL_MIN: i64 = 500;
const GOAL_MAX: i64 = 10_000;

/// Grams assumed when the user names a food without a quantity.
const DEFAULT_QUANTITY_G: f64 = 100.0;

#[derive(Clone)]
pub struct ChatService {
    store: Store,
    openai: OpenAiClient,
    fatsecret: FatSecretService,
}

/// Aggregated numbers for the current day.
#[derive(Debug, Clone, Copy, Default)]
pub struct TodayStats {
    pub eaten_kcal: f64,
    pub chat_kcal: f64,
    pub diary_kcal: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub burned_kcal: f64,
    pub goal_kcal: i64,
}

impl ChatService {
    pub fn new(store: Store, openai: OpenAiClient, fatsecret: FatSecretService) -> Self {
        Self {
            store,
            openai,
            fatsecret,
        }
    }

    /// Handle one text message end to end and return the reply.
    pub async fn handle_message(
        &self,
        chat_key: &str,
        username: &str,
        text: &str,
    ) -> Result<String, AppError> {
        let user = self.store.get_or_create_user(chat_key, username).await?;

        // Window is read before the new message lands so it isn't doubled
        // into the prompt.
        let since = time_utils::hours_ago(Utc::now(), WINDOW_HOURS);
        let window = self
            .store
            .conversation_window(user.id, &since, WINDOW_CAP)
            .await?;

        let stats = self.today_stats(&user).await?;
        let context = build_context(Utc::now(), &stats);

        // A turn always answers. Classification and handler failures degrade
        // to an apologetic reply instead of erroring the request.
        let classified = match self.openai.classify(&context, &window, text).await {
            Ok(classified) => classified,
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "Classification failed");
                ClassifiedIntent::unavailable()
            }
        };
        tracing::info!(
            user_id = user.id,
            intent = classified.intent.as_str(),
            "Message classified"
        );

        self.store
            .append_message(user.id, Role::User, text, Some(classified.intent.as_str()))
            .await?;

        let reply = match self.dispatch(&user, &classified).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    user_id = user.id,
                    intent = classified.intent.as_str(),
                    error = %e,
                    "Intent handler failed"
                );
                "Sorry, something went wrong while handling that. Please try again.".to_string()
            }
        };

        self.store
            .append_message(
                user.id,
                Role::Assistant,
                &reply,
                Some(classified.intent.as_str()),
            )
            .await?;

        Ok(reply)
    }

    /// Handle a voice message: transcribe, then treat as text. A failed
    /// transcription answers apologetically instead of erroring the request.
    pub async fn handle_voice(
        &self,
        chat_key: &str,
        username: &str,
        audio: Vec<u8>,
    ) -> Result<String, AppError> {
        let text = match self.openai.transcribe(audio, "voice.ogg").await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Voice transcription failed");
                return Ok(
                    "Sorry, I couldn't make out that voice message. Could you try again, or type it instead?"
                        .to_string(),
                );
            }
        };
        tracing::debug!(chars = text.len(), "Voice message transcribed");
        self.handle_message(chat_key, username, &text).await
    }

    async fn dispatch(&self, user: &User, classified: &ClassifiedIntent) -> Result<String, AppError> {
        // A calorie goal can ride along with any intent.
        let goal_note = match classified.calorie_goal {
            Some(goal) if (GOAL_MIN..=GOAL_MAX).contains(&goal) => {
                self.store.set_calorie_goal(user.id, goal).await?;
                Some(format!("Daily goal set to {} kcal.", goal))
            }
            Some(goal) => {
                return Ok(format!(
                    "A daily goal of {} kcal is out of range. Pick something between {} and {} kcal.",
                    goal, GOAL_MIN, GOAL_MAX
                ));
            }
            None => None,
        };

        let body = match classified.intent {
            IntentKind::LogFood => self.handle_log_food(user, classified).await?,
            IntentKind::QueryData => self.handle_query(user, classified).await?,
            IntentKind::DeleteEntry => self.handle_delete(user).await?,
            IntentKind::General => classified
                .reply
                .clone()
                .unwrap_or_else(|| "How can I help you today?".to_string()),
        };

        Ok(match goal_note {
            Some(note) => format!("{}\n{}", note, body),
            None => body,
        })
    }

    // ─── Intent Handlers ─────────────────────────────────────────

    async fn handle_log_food(
        &self,
        user: &User,
        classified: &ClassifiedIntent,
    ) -> Result<String, AppError> {
        if classified.food_items.is_empty() {
            return Ok("I couldn't tell what food that was. Try naming it directly, like \"200g chicken breast\".".to_string());
        }

        let mut lines = Vec::with_capacity(classified.food_items.len() + 1);
        for item in &classified.food_items {
            match self.log_one_item(user, item).await {
                Ok(line) => lines.push(line),
                Err(e) => {
                    tracing::warn!(user_id = user.id, food = %item.name, error = %e, "Logging item failed");
                    lines.push(format!(
                        "I couldn't log \"{}\" right now. Please try again.",
                        item.name
                    ));
                }
            }
        }

        let stats = self.live_today_stats(user).await?;
        lines.push(format_totals(&stats));
        Ok(lines.join("\n"))
    }

    /// Look up, scale, and persist one named food. Misses in the food
    /// database are reported in the reply, not as errors.
    async fn log_one_item(&self, user: &User, item: &FoodItem) -> Result<String, AppError> {
        let quantity_g = item.quantity_g.unwrap_or(DEFAULT_QUANTITY_G);
        if quantity_g <= 0.0 {
            return Ok(format!(
                "A quantity of {} g for \"{}\" doesn't look right, so I skipped it.",
                quantity_g, item.name
            ));
        }
        let meal = item
            .meal_type
            .unwrap_or_else(|| meal_for_hour(Utc::now().hour()));

        let hits = self.fatsecret.search_foods(&item.name, None).await?;
        let hit = match hits.first() {
            Some(hit) => hit,
            None => {
                return Ok(format!(
                    "I couldn't find \"{}\" in the food database.",
                    item.name
                ))
            }
        };

        let facts = match parse_food_description(&hit.food_description) {
            Some(facts) => facts,
            // Description wasn't per-grams; fall back to serving detail.
            None => self.facts_from_servings(&hit.food_id).await?,
        };
        let scaled = facts.scale_to(quantity_g);

        self.record_entry(user, hit.food_id.as_str(), &hit.food_name, &scaled, quantity_g, meal)
            .await?;

        Ok(format!(
            "Logged {} ({} g): {} kcal | Protein {} g | Fat {} g | Carbs {} g",
            hit.food_name, quantity_g, scaled.calories, scaled.protein, scaled.fat, scaled.carbs,
        ))
    }

    async fn facts_from_servings(&self, food_id: &str) -> Result<NutritionFacts, AppError> {
        let detail = self.fatsecret.get_food(food_id).await?;
        let servings = detail.servings.serving.into_vec();
        Ok(pick_gram_serving(&servings)
            .map(|s| s.nutrition_facts())
            .unwrap_or_default())
    }

    /// Persist the logged food. With the diary connected, the diary is the
    /// source of truth: write there and mirror the provider's entry locally
    /// so the next sync updates the same row. Otherwise store a chat entry.
    async fn record_entry(
        &self,
        user: &User,
        food_id: &str,
        food_name: &str,
        scaled: &NutritionFacts,
        quantity_g: f64,
        meal: MealType,
    ) -> Result<(), AppError> {
        if self.fatsecret.is_connected(user.id).await? {
            match self
                .fatsecret
                .log_to_diary(user.id, food_id, food_name, quantity_g, meal)
                .await
            {
                Ok(entry_id) => {
                    let now = time_utils::format_utc_rfc3339(Utc::now());
                    self.store
                        .upsert_diary_entry(
                            user.id,
                            &entry_id,
                            food_name,
                            scaled,
                            quantity_g,
                            "g",
                            meal.as_str(),
                            &now,
                        )
                        .await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(user_id = user.id, error = %e, "Diary write-back failed, storing locally");
                }
            }
        }

        self.store
            .insert_chat_entry(user.id, food_name, scaled, quantity_g, meal)
            .await?;
        Ok(())
    }

    async fn handle_query(
        &self,
        user: &User,
        classified: &ClassifiedIntent,
    ) -> Result<String, AppError> {
        let stats = self.today_stats(user).await?;
        let summary = format!(
            "{}\nProtein {} g | Fat {} g | Carbs {} g",
            format_totals(&stats),
            crate::models::food::round1(stats.protein),
            crate::models::food::round1(stats.fat),
            crate::models::food::round1(stats.carbs),
        );

        Ok(match &classified.reply {
            Some(reply) if !reply.is_empty() => format!("{}\n\n{}", reply, summary),
            _ => summary,
        })
    }

    async fn handle_delete(&self, user: &User) -> Result<String, AppError> {
        match self.store.delete_latest_chat_entry(user.id).await? {
            Some((name, calories)) => {
                let stats = self.today_stats(user).await?;
                Ok(format!(
                    "Removed {} ({} kcal).\n{}",
                    name,
                    crate::models::food::round1(calories),
                    format_totals(&stats)
                ))
            }
            None => Ok("There's nothing logged from chat to remove.".to_string()),
        }
    }

    // ─── Aggregation ─────────────────────────────────────────────

    /// Today's totals from stored rows only: everything eaten split by
    /// source, macros, and workout calories burned. Never touches the
    /// network, so it is safe on every read path.
    pub async fn today_stats(&self, user: &User) -> Result<TodayStats, AppError> {
        let day_start = time_utils::day_start(Utc::now());

        let entries = self.store.food_entries_since(user.id, &day_start).await?;
        let mut stats = TodayStats {
            goal_kcal: user.calorie_goal(),
            ..Default::default()
        };
        for entry in &entries {
            match entry.source.as_str() {
                "chat" => stats.chat_kcal += entry.calories,
                _ => stats.diary_kcal += entry.calories,
            }
            stats.protein += entry.protein;
            stats.fat += entry.fat;
            stats.carbs += entry.carbs;
        }

        stats.eaten_kcal = stats.chat_kcal + stats.diary_kcal;
        stats.burned_kcal = self.store.sum_workout_calories(user.id, &day_start).await?;
        Ok(stats)
    }

    /// Like `today_stats`, but with the diary connected its numbers come
    /// from a live fetch so the footer after logging reflects entries made
    /// outside this service. Falls back to the synced rows on any fetch
    /// error.
    pub async fn live_today_stats(&self, user: &User) -> Result<TodayStats, AppError> {
        let mut stats = self.today_stats(user).await?;

        if !self.fatsecret.is_connected(user.id).await? {
            return Ok(stats);
        }
        let diary = match self
            .fatsecret
            .diary_entries(user.id, Utc::now().date_naive())
            .await
        {
            Ok(diary) => diary,
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "Live diary fetch failed, using synced rows");
                return Ok(stats);
            }
        };

        // Replace the synced diary share with the provider's live view.
        let day_start = time_utils::day_start(Utc::now());
        let entries = self.store.food_entries_since(user.id, &day_start).await?;
        for entry in entries.iter().filter(|e| e.source == "diary") {
            stats.protein -= entry.protein;
            stats.fat -= entry.fat;
            stats.carbs -= entry.carbs;
        }
        stats.diary_kcal = 0.0;
        for entry in &diary {
            let facts = entry.nutrition_facts();
            stats.diary_kcal += facts.calories;
            stats.protein += facts.protein;
            stats.fat += facts.fat;
            stats.carbs += facts.carbs;
        }
        stats.eaten_kcal = stats.chat_kcal + stats.diary_kcal;
        Ok(stats)
    }

    /// Today's chat-only calories.
    pub async fn chat_calories_today(&self, user_id: i64) -> Result<f64, AppError> {
        let day_start = time_utils::day_start(Utc::now());
        self.store
            .sum_food_calories(user_id, &day_start, Some(FoodSource::Chat))
            .await
    }
}

/// Data context handed to the model alongside the system prompt, so replies
/// can reference the user's actual day.
fn build_context(now: chrono::DateTime<Utc>, stats: &TodayStats) -> String {
    format!(
        "Current UTC time: {}. Daily calorie goal: {} kcal. Eaten today: {} kcal ({} from chat, {} from the food diary). Burned today: {} kcal.",
        time_utils::format_utc_rfc3339(now),
        stats.goal_kcal,
        crate::models::food::round1(stats.eaten_kcal),
        crate::models::food::round1(stats.chat_kcal),
        crate::models::food::round1(stats.diary_kcal),
        crate::models::food::round1(stats.burned_kcal),
    )
}

fn format_totals(stats: &TodayStats) -> String {
    let mut line = format!(
        "Today: {} / {} kcal",
        crate::models::food::round1(stats.eaten_kcal),
        stats.goal_kcal
    );
    if stats.burned_kcal > 0.0 {
        line.push_str(&format!(
            " | Burned {} kcal",
            crate::models::food::round1(stats.burned_kcal)
        ));
    }
    line
}

/// Meal slot guessed from the hour when the model doesn't name one.
fn meal_for_hour(hour: u32) -> MealType {
    match hour {
        5..=10 => MealType::Breakfast,
        11..=15 => MealType::Lunch,
        16..=20 => MealType::Dinner,
        _ => MealType::Snack,
    }
}
