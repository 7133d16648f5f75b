//! API key management HTTP handlers.
//!
//! This module implements the key-related API endpoints:
//! - POST /api/v1/keys - Issue a new key (secret shown once)
//! - GET /api/v1/keys - List the caller's keys
//! - GET /api/v1/keys/{id} - Get one key
//! - PUT /api/v1/keys/{id} - Rename, change limit, (de)activate
//! - DELETE /api/v1/keys/{id} - Delete a key
//! - POST /api/v1/keys/validate - Check a key (public, charges one unit)
//!
//! Every route except validation requires a session and only ever touches
//! the caller's own keys; another user's key answers 404.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    handlers::analyze::API_KEY_HEADER,
    middleware::auth::AuthContext,
    models::api_key::{
        ApiKeyResponse, CreateApiKeyRequest, UpdateApiKeyRequest, ValidateKeyRequest,
        ValidateKeyResponse,
    },
};

/// Issue a new API key.
///
/// # Endpoint
///
/// `POST /api/v1/keys`
///
/// # Request Body
///
/// ```json
/// { "name": "CI pipeline", "limit": 500 }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the key, including `secret`. This is the only
///   time the secret is returned.
/// - **Error (400)**: blank name or non-positive limit
/// - **Error (401)**: no session
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), AppError> {
    let (key, secret) = state.ledger.create_key(auth.user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse::from(key).with_secret(secret)),
    ))
}

/// List the caller's keys, newest first.
///
/// # Endpoint
///
/// `GET /api/v1/keys`
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let keys = state.ledger.list_keys(auth.user_id).await?;

    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

/// Get one of the caller's keys.
///
/// # Endpoint
///
/// `GET /api/v1/keys/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: the key, without secret
/// - **Error (404)**: no such key, or it belongs to another user
pub async fn get_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let key = state.ledger.get_key(auth.user_id, id).await?;

    Ok(Json(key.into()))
}

/// Update one of the caller's keys.
///
/// # Endpoint
///
/// `PUT /api/v1/keys/{id}`
///
/// # Request Body
///
/// Any non-empty subset of:
///
/// ```json
/// { "name": "renamed", "limit": 200, "isActive": false }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: the updated key
/// - **Error (400)**: empty body, blank name, or a limit that is not positive
///   or is below the current usage
/// - **Error (404)**: no such key for this user
pub async fn update_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let key = state.ledger.update_key(auth.user_id, id, request).await?;

    Ok(Json(key.into()))
}

/// Delete one of the caller's keys.
///
/// # Endpoint
///
/// `DELETE /api/v1/keys/{id}`
///
/// # Response
///
/// - **Success (204 No Content)**
/// - **Error (404)**: no such key for this user
pub async fn delete_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.ledger.delete_key(auth.user_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Check that a key is valid and has quota left.
///
/// # Endpoint
///
/// `POST /api/v1/keys/validate`
///
/// # Authentication
///
/// None; the key under test is the credential. A successful check counts as
/// one unit of usage.
///
/// # Request Body
///
/// ```json
/// { "apiKey": "ghi_..." }
/// ```
///
/// The key may instead be sent in the `X-API-Key` header.
///
/// # Response
///
/// - **Success (200 OK)**:
///   `{ "valid": true, "message": "API key is valid", "remaining": 41, "limit": 100 }`
/// - **Error (401)**: key missing, malformed, unknown or inactive
/// - **Error (429)**: key usage limit reached
pub async fn validate_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateKeyRequest>,
) -> Result<Json<ValidateKeyResponse>, AppError> {
    let raw = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(request.api_key.as_deref());

    let usage = state.ledger.validate_and_charge(raw).await?;

    Ok(Json(ValidateKeyResponse {
        valid: true,
        message: "API key is valid".to_string(),
        remaining: usage.remaining(),
        limit: usage.usage_limit,
    }))
}
