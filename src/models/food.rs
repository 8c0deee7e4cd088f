// SPDX-License-Identifier: MIT

//! Food entry model and macro arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a food entry came from. Sync must never overwrite `Chat` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodSource {
    /// Logged conversationally through the assistant.
    Chat,
    /// Imported from the provider's diary by the sync engine.
    Diary,
}

impl FoodSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodSource::Chat => "chat",
            FoodSource::Diary => "diary",
        }
    }
}

impl fmt::Display for FoodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meal slot tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }

    /// The diary provider's meal name. It has no "snack" slot.
    pub fn as_diary_meal(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "other",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            "snack" => Ok(MealType::Snack),
            other => Err(format!("unknown meal type: {}", other)),
        }
    }
}

/// One logged food item.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FoodEntry {
    pub id: i64,
    pub user_id: i64,
    /// Name in the user's language (chat) or the provider's name (diary).
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub serving_size: f64,
    pub serving_unit: String,
    /// Meal slot, stored as text.
    pub meal_type: String,
    /// Provenance tag, stored as text ("chat" / "diary").
    pub source: String,
    /// Diary provider's native entry id. None for chat-logged entries.
    pub provider_entry_id: Option<String>,
    /// When the food was logged (RFC 3339).
    pub logged_at: String,
}

/// Reference macros for one serving of a food, as parsed from the provider's
/// description string ("Per 100g - Calories: 165kcal | ...").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutritionFacts {
    /// Reference serving size in grams.
    pub serving_size: f64,
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl Default for NutritionFacts {
    fn default() -> Self {
        Self {
            serving_size: 100.0,
            calories: 0.0,
            protein: 0.0,
            fat: 0.0,
            carbs: 0.0,
        }
    }
}

impl NutritionFacts {
    /// Linearly scale to the requested quantity in grams. Each macro is
    /// rounded to one decimal (half away from zero).
    pub fn scale_to(&self, quantity_g: f64) -> NutritionFacts {
        let reference = if self.serving_size > 0.0 {
            self.serving_size
        } else {
            100.0
        };
        let factor = quantity_g / reference;
        NutritionFacts {
            serving_size: quantity_g,
            calories: round1(self.calories * factor),
            protein: round1(self.protein * factor),
            fat: round1(self.fat * factor),
            carbs: round1(self.carbs * factor),
        }
    }
}

/// Round to one decimal place, half away from zero.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
