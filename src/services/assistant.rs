// SPDX-License-Identifier: MIT

//! LLM client: intent classification over the conversation window, plus
//! voice transcription.
//!
//! Classification is a single structured chat-completion call that returns
//! a JSON object. A malformed or unrecognized response never fails the
//! request; it downgrades to the `general` intent so the user still gets a
//! reply.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::error::AppError;
use crate::models::{ConversationMessage, MealType};

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 1024;
const COMPLETION_ATTEMPTS: u32 = 3;

const SYSTEM_PROMPT: &str = "\
You are a personal health assistant. You track the user's food, calories, \
workouts, recovery and sleep. Reply in the user's language (Ukrainian or \
English).\n\
\n\
Classify every user message and respond with a single JSON object:\n\
{\n\
  \"intent\": \"log_food\" | \"query_data\" | \"delete_entry\" | \"general\",\n\
  \"food_items\": [{\"name\": \"<english food name>\", \"quantity_g\": <number>, \
\"meal_type\": \"breakfast\" | \"lunch\" | \"dinner\" | \"snack\"}],\n\
  \"calorie_goal\": <number, only when the user sets a daily calorie goal>,\n\
  \"reply\": \"<your conversational reply, for query_data and general>\"\n\
}\n\
\n\
Rules:\n\
- log_food: the user ate or drank something; one food_items element per \
food. Translate names to English for database lookup. Estimate quantity_g \
if not stated.\n\
- query_data: the user asks about their calories, macros, workouts, \
recovery, sleep or goals.\n\
- delete_entry: the user wants the last logged food removed.\n\
- general: anything else; answer briefly and helpfully.";

/// Parsed intent of one user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    LogFood,
    QueryData,
    DeleteEntry,
    General,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::LogFood => "log_food",
            IntentKind::QueryData => "query_data",
            IntentKind::DeleteEntry => "delete_entry",
            IntentKind::General => "general",
        }
    }
}

impl FromStr for IntentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log_food" => Ok(IntentKind::LogFood),
            "query_data" => Ok(IntentKind::QueryData),
            "delete_entry" => Ok(IntentKind::DeleteEntry),
            "general" => Ok(IntentKind::General),
            other => Err(format!("unknown intent: {}", other)),
        }
    }
}

/// One food item the model extracted from the message.
#[derive(Debug, Clone)]
pub struct FoodItem {
    pub name: String,
    pub quantity_g: Option<f64>,
    pub meal_type: Option<MealType>,
}

/// The model's structured answer, with the downgrade rule already applied.
#[derive(Debug, Clone)]
pub struct ClassifiedIntent {
    pub intent: IntentKind,
    pub food_items: Vec<FoodItem>,
    pub calorie_goal: Option<i64>,
    pub reply: Option<String>,
}

impl ClassifiedIntent {
    fn general(reply: Option<String>) -> Self {
        Self {
            intent: IntentKind::General,
            food_items: Vec::new(),
            calorie_goal: None,
            reply,
        }
    }

    /// Stand-in when the classification call itself fails; the turn still
    /// gets a reply.
    pub fn unavailable() -> Self {
        Self::general(Some(
            "Sorry, I'm having trouble understanding right now. Please try again in a moment."
                .to_string(),
        ))
    }
}

/// Raw JSON shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct RawIntent {
    intent: Option<String>,
    #[serde(default)]
    food_items: Vec<RawFoodItem>,
    calorie_goal: Option<i64>,
    reply: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFoodItem {
    name: Option<String>,
    quantity_g: Option<f64>,
    meal_type: Option<String>,
}

/// Parse the model's JSON content. Unparseable output downgrades to
/// `general` carrying the raw text as the reply; an unknown or missing
/// intent downgrades too. A turn never fails on the model's formatting.
pub fn parse_intent(content: &str) -> ClassifiedIntent {
    let raw: RawIntent = match serde_json::from_str(content) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable intent payload, downgrading to general");
            return ClassifiedIntent::general(Some(content.to_string()));
        }
    };

    let intent = raw
        .intent
        .as_deref()
        .and_then(|s| IntentKind::from_str(s).ok())
        .unwrap_or(IntentKind::General);

    let food_items = raw
        .food_items
        .into_iter()
        .filter_map(|item| {
            let name = item.name?;
            if name.trim().is_empty() {
                return None;
            }
            Some(FoodItem {
                name: name.trim().to_string(),
                quantity_g: item.quantity_g,
                meal_type: item.meal_type.and_then(|m| m.parse().ok()),
            })
        })
        .collect();

    ClassifiedIntent {
        intent,
        food_items,
        calorie_goal: raw.calorie_goal,
        reply: raw.reply,
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Point the client at a different API host (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Classify one user message given the user's data context and the
    /// bounded conversation window.
    pub async fn classify(
        &self,
        context: &str,
        window: &[ConversationMessage],
        text: &str,
    ) -> Result<ClassifiedIntent, AppError> {
        let mut messages = Vec::with_capacity(window.len() + 3);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        if !context.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: context.to_string(),
            });
        }
        for message in window {
            messages.push(ChatMessage {
                role: message.role.clone(),
                content: message.content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: text.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let content = self.chat_completion(&request).await?;
        Ok(parse_intent(&content))
    }

    /// Raw chat-completion round-trip with retry on 429/5xx.
    async fn chat_completion(&self, request: &ChatRequest) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_err = None;

        for attempt in 1..=COMPLETION_ATTEMPTS {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| AppError::Provider(format!("Completion request failed: {}", e)))?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!(attempt, status = %status, "Completion retryable failure");
                last_err = Some(if status.as_u16() == 429 {
                    AppError::RateLimited
                } else {
                    AppError::Provider(format!("HTTP {}", status))
                });
                tokio::time::sleep(StdDuration::from_secs(attempt as u64)).await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Provider(format!("HTTP {}: {}", status, body)));
            }

            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| AppError::MalformedResponse(format!("Completion body: {}", e)))?;

            return body
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| AppError::MalformedResponse("Completion had no choices".into()));
        }

        Err(last_err.unwrap_or_else(|| AppError::Provider("Completion retries exhausted".into())))
    }

    /// Transcribe a voice message (Whisper).
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, AppError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/ogg")
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid mime: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", "whisper-1");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Transcription request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Transcription failed, HTTP {}: {}",
                status, body
            )));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("Transcription body: {}", e)))?;
        Ok(body.text)
    }
}
