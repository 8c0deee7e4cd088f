// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod conversation;
pub mod food;
pub mod record;
pub mod token;
pub mod user;

pub use conversation::{ConversationMessage, Role};
pub use food::{FoodEntry, FoodSource, MealType, NutritionFacts};
pub use record::{ExternalRecord, RecordKind};
pub use token::{OAuthToken, Provider};
pub use user::User;
