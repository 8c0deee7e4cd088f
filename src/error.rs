// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::Provider;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An OAuth handshake step failed. Recoverable: the user is asked to
    /// retry connecting the provider.
    #[error("Authorization request failed: {0}")]
    AuthRequestFailed(String),

    /// The provider rejected the stored credential permanently. The token
    /// has been cleared; the user must re-authorize.
    #[error("{0} token revoked, re-authorization required")]
    TokenRevoked(Provider),

    /// A provider returned 5xx or the request timed out. Retried with
    /// backoff, then skipped for the current cycle.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A provider returned 429.
    #[error("Rate limited by provider")]
    RateLimited,

    /// A provider or LLM payload did not match the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A proposed value is outside its allowed bounds.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for credential failures that mean "reconnect the provider":
    /// both the terminal revocation and a failed handshake step.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AppError::TokenRevoked(_) | AppError::AuthRequestFailed(_)
        )
    }

    /// True for failures worth retrying with backoff inside one call.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Provider(_) | AppError::RateLimited)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::AuthRequestFailed(msg) => (
                StatusCode::BAD_GATEWAY,
                "auth_request_failed",
                Some(msg.clone()),
            ),
            AppError::TokenRevoked(provider) => (
                StatusCode::UNAUTHORIZED,
                "token_revoked",
                Some(provider.to_string()),
            ),
            AppError::Provider(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(msg.clone()))
            }
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None),
            AppError::MalformedResponse(msg) => (
                StatusCode::BAD_GATEWAY,
                "malformed_response",
                Some(msg.clone()),
            ),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                Some(msg.clone()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_are_token_errors() {
        assert!(AppError::TokenRevoked(Provider::Whoop).is_token_error());
        assert!(AppError::AuthRequestFailed("denied".into()).is_token_error());
        assert!(!AppError::RateLimited.is_token_error());
        assert!(!AppError::Database("down".into()).is_token_error());
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(AppError::Provider("502".into()).is_transient());
        assert!(AppError::RateLimited.is_transient());
        assert!(!AppError::TokenRevoked(Provider::FatSecret).is_transient());
    }
}
