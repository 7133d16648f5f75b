//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Input Errors**: malformed URLs, missing or invalid fields
/// - **Authentication Errors**: missing session, unknown or inactive API keys
/// - **Quota Errors**: key is valid but its usage limit is reached
/// - **Resource Errors**: repository, key or history entry not found
/// - **Upstream Errors**: GitHub or the completion service failed
/// - **Internal Errors**: database and other unexpected failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Returns HTTP 500; the details are logged, never sent to the client.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400. The String says what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// No session (and no key where one would do).
    ///
    /// Returns HTTP 401.
    #[error("Authentication required")]
    Unauthenticated,

    /// API key is missing, malformed, unknown, or inactive.
    ///
    /// Returns HTTP 401.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// API key is valid but its usage count has reached its limit.
    ///
    /// Returns HTTP 429.
    #[error("API key usage limit reached")]
    QuotaExceeded,

    /// GitHub repository does not exist, is private, or was never analyzed.
    ///
    /// Returns HTTP 404.
    #[error("Repository not found or inaccessible")]
    RepositoryNotFound,

    /// Key does not exist or belongs to another user.
    ///
    /// Returns HTTP 404.
    #[error("API key not found")]
    ApiKeyNotFound,

    /// History entry does not exist or belongs to another user.
    ///
    /// Returns HTTP 404.
    #[error("History entry not found")]
    HistoryEntryNotFound,

    /// GitHub or the completion service could not serve the request.
    ///
    /// Returns HTTP 502.
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Any other unexpected failure.
    ///
    /// Returns HTTP 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Internal and database errors are logged here and answered with a generic
/// message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                self.to_string(),
            ),
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::QuotaExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                self.to_string(),
            ),
            AppError::RepositoryNotFound => (
                StatusCode::NOT_FOUND,
                "repository_not_found",
                self.to_string(),
            ),
            AppError::ApiKeyNotFound => {
                (StatusCode::NOT_FOUND, "api_key_not_found", self.to_string())
            }
            AppError::HistoryEntryNotFound => (
                StatusCode::NOT_FOUND,
                "history_entry_not_found",
                self.to_string(),
            ),
            AppError::Upstream(ref detail) => {
                tracing::warn!("Upstream failure: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "An upstream service failed to respond".to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
