// SPDX-License-Identifier: MIT

//! Nutrition-diary provider client and service.
//!
//! Two auth schemes against one platform:
//! - OAuth 2.0 client-credentials for the public food database (search,
//!   food detail), with an app-level bearer cached until expiry.
//! - OAuth 1.0 three-legged (HMAC-SHA1) for per-user diary access. These
//!   tokens never expire; revocation is the only way they die.
//!
//! All platform methods go through one REST endpoint selected by a `method`
//! query parameter. Errors can arrive as HTTP failures or as an `error`
//! object inside a 200 body; both are handled.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::{
    ExternalRecord, MealType, NutritionFacts, OAuthToken, Provider, RecordKind, User,
};
use crate::services::oauth1::OAuth1Signer;
use crate::services::TokenVault;

/// Refresh the app-level bearer this long before it actually expires.
const BEARER_EXPIRY_MARGIN_SECS: i64 = 60;

/// Default result cap for food search.
const SEARCH_MAX_RESULTS: u32 = 20;

#[derive(Clone)]
struct CachedBearer {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Low-level platform client.
#[derive(Clone)]
pub struct FatSecretClient {
    http: reqwest::Client,
    /// The single REST endpoint all signed/bearer API calls go to.
    api_url: String,
    /// OAuth 2.0 client-credentials token endpoint.
    oauth2_token_url: String,
    /// OAuth 1.0 handshake endpoints.
    request_token_url: String,
    access_token_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    signer: OAuth1Signer,
    bearer: Arc<RwLock<Option<CachedBearer>>>,
}

impl FatSecretClient {
    pub fn new(client_id: &str, client_secret: &str, shared_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: "https://platform.fatsecret.com/rest/server.api".to_string(),
            oauth2_token_url: "https://oauth.fatsecret.com/connect/token".to_string(),
            request_token_url: "https://authentication.fatsecret.com/oauth/request_token"
                .to_string(),
            access_token_url: "https://authentication.fatsecret.com/oauth/access_token"
                .to_string(),
            authorize_url: "https://authentication.fatsecret.com/oauth/authorize".to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            signer: OAuth1Signer::new(client_id, shared_secret),
            bearer: Arc::new(RwLock::new(None)),
        }
    }

    /// Point every endpoint at a different host (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.api_url = format!("{}/rest/server.api", base);
        self.oauth2_token_url = format!("{}/connect/token", base);
        self.request_token_url = format!("{}/oauth/request_token", base);
        self.access_token_url = format!("{}/oauth/access_token", base);
        self.authorize_url = format!("{}/oauth/authorize", base);
        self
    }

    // ─── OAuth 1.0 Three-Legged Handshake ────────────────────────

    /// Step 1: obtain a temporary request token.
    pub async fn request_token(&self, callback_url: &str) -> Result<Handshake, AppError> {
        let params = self.signer.signed_params(
            "POST",
            &self.request_token_url,
            &[("oauth_callback".to_string(), callback_url.to_string())],
            None,
        )?;

        let body = self
            .handshake_request(&self.request_token_url, &params)
            .await?;
        Self::parse_handshake(&body)
    }

    /// The URL the user must visit to approve access.
    pub fn authorize_url(&self, request_token: &str) -> String {
        format!(
            "{}?oauth_token={}",
            self.authorize_url,
            urlencoding::encode(request_token)
        )
    }

    /// Step 3: trade the approved request token for a permanent access
    /// token pair.
    pub async fn access_token(
        &self,
        request_token: &str,
        request_secret: &str,
        verifier: &str,
    ) -> Result<Handshake, AppError> {
        let params = self.signer.signed_params(
            "POST",
            &self.access_token_url,
            &[("oauth_verifier".to_string(), verifier.to_string())],
            Some((request_token, request_secret)),
        )?;

        let body = self
            .handshake_request(&self.access_token_url, &params)
            .await?;
        Self::parse_handshake(&body)
    }

    /// Both handshake steps are signed and sent as POST. Any non-2xx aborts
    /// the whole flow; the user starts over. Protocol parameters travel in
    /// the Authorization header.
    async fn handshake_request(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<String, AppError> {
        let query: Vec<&(String, String)> = params
            .iter()
            .filter(|(k, _)| !k.starts_with("oauth_"))
            .collect();

        let response = self
            .http
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                crate::services::oauth1::build_header(params),
            )
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::AuthRequestFailed(format!("Handshake request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "OAuth 1.0 handshake step rejected");
            return Err(AppError::AuthRequestFailed(format!(
                "Handshake failed with status {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::AuthRequestFailed(format!("Handshake read failed: {}", e)))
    }

    /// Handshake responses are form-encoded: `oauth_token=..&oauth_token_secret=..`.
    fn parse_handshake(body: &str) -> Result<Handshake, AppError> {
        let mut token = None;
        let mut secret = None;
        for pair in body.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let value = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                match key {
                    "oauth_token" => token = Some(value),
                    "oauth_token_secret" => secret = Some(value),
                    _ => {}
                }
            }
        }
        match (token, secret) {
            (Some(token), Some(secret)) => Ok(Handshake { token, secret }),
            // An unparsable body means the handshake step failed; the user
            // is asked to reconnect.
            _ => Err(AppError::AuthRequestFailed(format!(
                "Handshake body missing token fields: {}",
                body
            ))),
        }
    }

    // ─── OAuth 2.0 Client-Credentials (Public Search) ────────────

    /// App-level bearer for the public food database, cached until shortly
    /// before expiry.
    async fn bearer_token(&self) -> Result<String, AppError> {
        {
            let cached = self.bearer.read().await;
            if let Some(bearer) = cached.as_ref() {
                if Utc::now() + Duration::seconds(BEARER_EXPIRY_MARGIN_SECS) < bearer.expires_at {
                    return Ok(bearer.token.clone());
                }
            }
        }

        let response = self
            .http
            .post(&self.oauth2_token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "basic")])
            .send()
            .await
            .map_err(|e| AppError::AuthRequestFailed(format!("Bearer request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::AuthRequestFailed(format!(
                "Bearer request failed with status {}",
                status
            )));
        }

        let body: BearerResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("Bearer response: {}", e)))?;

        let bearer = CachedBearer {
            token: body.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        };
        *self.bearer.write().await = Some(bearer);
        Ok(body.access_token)
    }

    /// Search the public food database.
    pub async fn search_foods(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<FoodSummary>, AppError> {
        let bearer = self.bearer_token().await?;
        let response = self
            .http
            .get(&self.api_url)
            .bearer_auth(bearer)
            .query(&[
                ("method", "foods.search"),
                ("search_expression", query),
                ("max_results", &max_results.to_string()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        let body: FoodsSearchResponse = self.check_response_json(response).await?;
        Ok(body.foods.map(|f| f.food.into_vec()).unwrap_or_default())
    }

    /// Full food detail with servings.
    pub async fn get_food(&self, food_id: &str) -> Result<FoodDetail, AppError> {
        let bearer = self.bearer_token().await?;
        let response = self
            .http
            .get(&self.api_url)
            .bearer_auth(bearer)
            .query(&[
                ("method", "food.get.v2"),
                ("food_id", food_id),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        let body: FoodGetResponse = self.check_response_json(response).await?;
        Ok(body.food)
    }

    // ─── Signed Per-User Diary Calls ─────────────────────────────

    /// Diary entries for one day, dated by days since the Unix epoch.
    pub async fn diary_entries(
        &self,
        token: &str,
        secret: &str,
        date_int: i64,
    ) -> Result<Vec<DiaryEntry>, AppError> {
        let body: FoodEntriesResponse = self
            .signed_get(
                token,
                secret,
                &[
                    ("method".to_string(), "food_entries.get.v2".to_string()),
                    ("date".to_string(), date_int.to_string()),
                    ("format".to_string(), "json".to_string()),
                ],
            )
            .await?;
        Ok(body
            .food_entries
            .map(|e| e.food_entry.into_vec())
            .unwrap_or_default())
    }

    /// Write one entry into the user's diary. Returns the new entry's
    /// native id.
    pub async fn create_diary_entry(
        &self,
        token: &str,
        secret: &str,
        entry: &NewDiaryEntry<'_>,
    ) -> Result<String, AppError> {
        let body: FoodEntryCreateResponse = self
            .signed_get(
                token,
                secret,
                &[
                    ("method".to_string(), "food_entry.create".to_string()),
                    ("food_id".to_string(), entry.food_id.to_string()),
                    ("serving_id".to_string(), entry.serving_id.to_string()),
                    ("number_of_units".to_string(), entry.number_of_units.to_string()),
                    ("meal".to_string(), entry.meal.to_string()),
                    ("food_entry_name".to_string(), entry.name.to_string()),
                    ("format".to_string(), "json".to_string()),
                ],
            )
            .await?;
        Ok(body.food_entry_id.value)
    }

    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        token: &str,
        secret: &str,
        extra: &[(String, String)],
    ) -> Result<T, AppError> {
        let params =
            self.signer
                .signed_params("GET", &self.api_url, extra, Some((token, secret)))?;

        let response = self
            .http
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check HTTP status, then look for the platform's in-band `error`
    /// object before deserializing the real payload.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Diary provider rate limit hit (429)");
                return Err(AppError::RateLimited);
            }

            return Err(AppError::Provider(format!("HTTP {}: {}", status, body)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        if let Ok(err) = serde_json::from_str::<ApiErrorEnvelope>(&text) {
            // Code 4 is "invalid access token": the user revoked us.
            if err.error.code == 4 {
                return Err(AppError::TokenRevoked(Provider::FatSecret));
            }
            return Err(AppError::Provider(format!(
                "API error {}: {}",
                err.error.code, err.error.message
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::MalformedResponse(format!("JSON parse error: {}", e)))
    }
}

/// One OAuth 1.0 token pair, from either handshake step.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub token: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
struct BearerResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

/// The platform serializes a one-element list as a bare object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FoodsSearchResponse {
    foods: Option<FoodsList>,
}

#[derive(Debug, Deserialize)]
struct FoodsList {
    food: OneOrMany<FoodSummary>,
}

/// One search hit. All numeric fields arrive as strings.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct FoodSummary {
    pub food_id: String,
    pub food_name: String,
    pub food_description: String,
    #[serde(default)]
    pub brand_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FoodGetResponse {
    food: FoodDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FoodDetail {
    pub food_id: String,
    pub food_name: String,
    pub servings: ServingsList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServingsList {
    pub serving: OneOrMany<FoodServing>,
}

/// One serving definition for a food.
#[derive(Debug, Clone, Deserialize)]
pub struct FoodServing {
    pub serving_id: String,
    #[serde(default)]
    pub metric_serving_amount: Option<String>,
    #[serde(default)]
    pub metric_serving_unit: Option<String>,
    #[serde(default)]
    pub number_of_units: Option<String>,
    #[serde(default)]
    pub measurement_description: Option<String>,
    #[serde(default)]
    pub calories: Option<String>,
    #[serde(default)]
    pub protein: Option<String>,
    #[serde(default)]
    pub fat: Option<String>,
    #[serde(default)]
    pub carbohydrate: Option<String>,
}

impl FoodServing {
    fn metric_grams(&self) -> Option<f64> {
        let unit = self.metric_serving_unit.as_deref()?;
        if !unit.eq_ignore_ascii_case("g") {
            return None;
        }
        parse_num(self.metric_serving_amount.as_deref())
    }

    /// Macros for this serving at its metric gram amount.
    pub fn nutrition_facts(&self) -> NutritionFacts {
        NutritionFacts {
            serving_size: self.metric_grams().unwrap_or(100.0),
            calories: parse_num(self.calories.as_deref()).unwrap_or(0.0),
            protein: parse_num(self.protein.as_deref()).unwrap_or(0.0),
            fat: parse_num(self.fat.as_deref()).unwrap_or(0.0),
            carbs: parse_num(self.carbohydrate.as_deref()).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FoodEntriesResponse {
    food_entries: Option<FoodEntriesList>,
}

#[derive(Debug, Deserialize)]
struct FoodEntriesList {
    food_entry: OneOrMany<DiaryEntry>,
}

/// One diary row as the provider returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct DiaryEntry {
    pub food_entry_id: String,
    pub food_entry_name: String,
    #[serde(default)]
    pub calories: Option<String>,
    #[serde(default)]
    pub protein: Option<String>,
    #[serde(default)]
    pub fat: Option<String>,
    #[serde(default)]
    pub carbohydrate: Option<String>,
    #[serde(default)]
    pub number_of_units: Option<String>,
    #[serde(default)]
    pub meal: Option<String>,
    #[serde(default)]
    pub date_int: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FoodEntryCreateResponse {
    food_entry_id: IdValue,
}

#[derive(Debug, Deserialize)]
struct IdValue {
    value: String,
}

/// Parameters for writing one diary entry.
#[derive(Debug)]
pub struct NewDiaryEntry<'a> {
    pub food_id: &'a str,
    pub serving_id: &'a str,
    pub number_of_units: f64,
    /// Provider meal name ("breakfast" / "lunch" / "dinner" / "other").
    pub meal: &'a str,
    pub name: &'a str,
}

fn parse_num(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// Parse the search-hit description line:
/// `Per 100g - Calories: 165kcal | Fat: 3.60g | Carbs: 0.00g | Protein: 31.00g`
///
/// Returns None when the line doesn't follow the per-grams shape (e.g.
/// "Per 1 serving"), in which case the caller falls back to serving detail.
pub fn parse_food_description(description: &str) -> Option<NutritionFacts> {
    let (head, tail) = description.split_once(" - ")?;

    let head = head.strip_prefix("Per ")?.trim();
    let grams_part = head.strip_suffix('g')?.trim();
    let serving_size: f64 = grams_part.parse().ok()?;

    let mut facts = NutritionFacts {
        serving_size,
        ..Default::default()
    };

    for segment in tail.split('|') {
        let (label, value) = segment.split_once(':')?;
        let number: String = value
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let number: f64 = number.parse().ok()?;
        match label.trim() {
            "Calories" => facts.calories = number,
            "Fat" => facts.fat = number,
            "Carbs" => facts.carbs = number,
            "Protein" => facts.protein = number,
            _ => {}
        }
    }

    Some(facts)
}

/// Pick the serving to use as a per-gram basis: a 1g metric serving wins,
/// then a 100g one, then the smallest gram-denominated serving.
pub fn pick_gram_serving(servings: &[FoodServing]) -> Option<&FoodServing> {
    let gram_servings: Vec<(&FoodServing, f64)> = servings
        .iter()
        .filter_map(|s| s.metric_grams().map(|g| (s, g)))
        .collect();

    if let Some((serving, _)) = gram_servings.iter().find(|(_, g)| *g == 1.0) {
        return Some(serving);
    }
    if let Some((serving, _)) = gram_servings.iter().find(|(_, g)| *g == 100.0) {
        return Some(serving);
    }
    gram_servings
        .into_iter()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(serving, _)| serving)
}

/// How many serving units cover `grams` for a gram-denominated serving.
pub fn units_for_grams(serving: &FoodServing, grams: f64) -> f64 {
    let per_unit = match (
        parse_num(serving.metric_serving_amount.as_deref()),
        parse_num(serving.number_of_units.as_deref()),
    ) {
        (Some(amount), Some(units)) if units > 0.0 => amount / units,
        (Some(amount), None) => amount,
        _ => return grams,
    };
    if per_unit <= 0.0 {
        return grams;
    }
    ((grams / per_unit) * 100.0).round() / 100.0
}

/// Days since the Unix epoch, the diary API's date encoding.
pub fn date_int(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(date);
    (date - epoch).num_days()
}

// ─────────────────────────────────────────────────────────────────────────────
// FatSecretService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

/// High-level diary service. Per-user calls resolve the stored OAuth 1.0
/// pair from the vault; a revocation clears it.
#[derive(Clone)]
pub struct FatSecretService {
    client: FatSecretClient,
    vault: TokenVault,
}

impl FatSecretService {
    pub fn new(client: FatSecretClient, vault: TokenVault) -> Self {
        Self { client, vault }
    }

    // ─── Connect Flow ────────────────────────────────────────────

    /// Begin the three-legged handshake. The returned request secret must
    /// be held by the caller until the callback arrives.
    pub async fn connect_start(&self, callback_url: &str) -> Result<ConnectStart, AppError> {
        let handshake = self.client.request_token(callback_url).await?;
        let authorize_url = self.client.authorize_url(&handshake.token);
        Ok(ConnectStart {
            request_token: handshake.token,
            request_secret: handshake.secret,
            authorize_url,
        })
    }

    /// Finish the handshake and store the permanent pair.
    pub async fn connect_finish(
        &self,
        user: &User,
        request_token: &str,
        request_secret: &str,
        verifier: &str,
    ) -> Result<(), AppError> {
        let access = self
            .client
            .access_token(request_token, request_secret, verifier)
            .await?;

        let token = OAuthToken {
            user_id: user.id,
            provider: Provider::FatSecret.as_str().to_string(),
            access_token: access.token,
            access_secret: Some(access.secret),
            refresh_token: None,
            expires_at: None,
        };
        self.vault.save(&token).await?;
        tracing::info!(user_id = user.id, "Diary provider connected");
        Ok(())
    }

    /// Whether the user has a stored diary credential.
    pub async fn is_connected(&self, user_id: i64) -> Result<bool, AppError> {
        Ok(self.vault.get(user_id, Provider::FatSecret).await?.is_some())
    }

    // ─── Public Database ─────────────────────────────────────────

    pub async fn search_foods(
        &self,
        query: &str,
        max_results: Option<u32>,
    ) -> Result<Vec<FoodSummary>, AppError> {
        self.client
            .search_foods(query, max_results.unwrap_or(SEARCH_MAX_RESULTS))
            .await
    }

    pub async fn get_food(&self, food_id: &str) -> Result<FoodDetail, AppError> {
        self.client.get_food(food_id).await
    }

    // ─── Per-User Diary ──────────────────────────────────────────

    async fn user_pair(&self, user_id: i64) -> Result<(String, String), AppError> {
        let token = self
            .vault
            .get(user_id, Provider::FatSecret)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Diary token for user {}", user_id)))?;
        let secret = token
            .access_secret
            .ok_or(AppError::TokenRevoked(Provider::FatSecret))?;
        Ok((token.access_token, secret))
    }

    /// Diary rows for one day. A revoked token is cleared before the error
    /// propagates.
    pub async fn diary_entries(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<DiaryEntry>, AppError> {
        let (token, secret) = self.user_pair(user_id).await?;
        match self
            .client
            .diary_entries(&token, &secret, date_int(date))
            .await
        {
            Err(AppError::TokenRevoked(provider)) => {
                self.vault.clear(user_id, provider).await?;
                Err(AppError::TokenRevoked(provider))
            }
            other => other,
        }
    }

    /// Write a chat-logged food into the user's diary. Returns the native
    /// entry id for provenance tracking.
    pub async fn log_to_diary(
        &self,
        user_id: i64,
        food_id: &str,
        name: &str,
        grams: f64,
        meal: MealType,
    ) -> Result<String, AppError> {
        let (token, secret) = self.user_pair(user_id).await?;

        let detail = self.client.get_food(food_id).await?;
        let servings = detail.servings.serving.clone().into_vec();
        let serving = pick_gram_serving(&servings).ok_or_else(|| {
            AppError::MalformedResponse(format!("No gram serving for food {}", food_id))
        })?;

        let entry = NewDiaryEntry {
            food_id,
            serving_id: &serving.serving_id,
            number_of_units: units_for_grams(serving, grams),
            meal: meal.as_diary_meal(),
            name,
        };

        match self.client.create_diary_entry(&token, &secret, &entry).await {
            Err(AppError::TokenRevoked(provider)) => {
                self.vault.clear(user_id, provider).await?;
                Err(AppError::TokenRevoked(provider))
            }
            other => other,
        }
    }
}

/// State handed to the caller between handshake steps.
#[derive(Debug, Clone)]
pub struct ConnectStart {
    pub request_token: String,
    pub request_secret: String,
    pub authorize_url: String,
}

impl DiaryEntry {
    /// Normalize to an external record for idempotent storage.
    pub fn to_external_record(&self, user_id: i64, synced_at: &str) -> ExternalRecord {
        let logged_at = self
            .date_int
            .as_deref()
            .and_then(|d| d.parse::<i64>().ok())
            .and_then(|days| {
                NaiveDate::from_ymd_opt(1970, 1, 1)
                    .map(|epoch| epoch + chrono::Days::new(days.max(0) as u64))
            })
            .map(|date| format!("{}T00:00:00Z", date))
            .unwrap_or_else(|| synced_at.to_string());

        ExternalRecord {
            provider: Provider::FatSecret.as_str().to_string(),
            native_id: self.food_entry_id.clone(),
            user_id,
            kind: RecordKind::DiaryEntry.as_str().to_string(),
            started_at: logged_at,
            score_state: "SCORED".to_string(),
            calories: parse_num(self.calories.as_deref()),
            strain: None,
            recovery_score: None,
            sleep_minutes: None,
            synced_at: synced_at.to_string(),
        }
    }

    pub fn nutrition_facts(&self) -> NutritionFacts {
        NutritionFacts {
            serving_size: parse_num(self.number_of_units.as_deref()).unwrap_or(1.0),
            calories: parse_num(self.calories.as_deref()).unwrap_or(0.0),
            protein: parse_num(self.protein.as_deref()).unwrap_or(0.0),
            fat: parse_num(self.fat.as_deref()).unwrap_or(0.0),
            carbs: parse_num(self.carbohydrate.as_deref()).unwrap_or(0.0),
        }
    }
}
