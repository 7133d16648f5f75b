//! Analysis history (dashboard) handlers.
//!
//! - GET /api/v1/history - Paginated list, newest first
//! - PUT /api/v1/history/{id}/favorite - Set or clear the favorite flag
//! - DELETE /api/v1/history/{id} - Remove an entry (the analysis itself stays)
//!
//! `{id}` is the history entry ID, not the repository ID. Entries of other
//! users answer 404.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    middleware::auth::AuthContext,
    models::repository::{
        FavoriteRequest, FavoriteResponse, HistoryEntry, HistoryQuery, HistoryResponse,
        Pagination,
    },
};

/// List the caller's analyzed repositories.
///
/// # Endpoint
///
/// `GET /api/v1/history?page=1&limit=10`
///
/// `page` defaults to 1; `limit` defaults to 10 and is capped at 100.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "history": [
///     {
///       "id": "...",
///       "repoId": "...",
///       "repoOwner": "octocat",
///       "repoName": "Hello-World",
///       "isFavorite": false
///     }
///   ],
///   "pagination": { "page": 1, "limit": 10, "totalItems": 1, "totalPages": 1 }
/// }
/// ```
pub async fn list_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let (page, limit) = query.normalized();
    let offset = (page - 1) * limit;

    let (rows, total) = state
        .repositories
        .history(auth.user_id, limit, offset)
        .await?;

    Ok(Json(HistoryResponse {
        history: rows.into_iter().map(HistoryEntry::from).collect(),
        pagination: Pagination::new(page, limit, total),
    }))
}

/// Set or clear the favorite flag of a history entry.
///
/// # Endpoint
///
/// `PUT /api/v1/history/{id}/favorite`
///
/// # Request Body
///
/// ```json
/// { "isFavorite": true }
/// ```
pub async fn set_favorite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<FavoriteRequest>,
) -> Result<Json<FavoriteResponse>, AppError> {
    let updated = state
        .repositories
        .set_favorite(auth.user_id, id, request.is_favorite)
        .await?;

    if !updated {
        return Err(AppError::HistoryEntryNotFound);
    }

    Ok(Json(FavoriteResponse {
        id,
        is_favorite: request.is_favorite,
    }))
}

/// Remove an entry from the caller's history.
///
/// # Endpoint
///
/// `DELETE /api/v1/history/{id}`
///
/// # Response
///
/// - **Success (204 No Content)**
/// - **Error (404)**: no such entry for this user
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.repositories.delete_link(auth.user_id, id).await? {
        return Err(AppError::HistoryEntryNotFound);
    }

    tracing::info!(entry_id = %id, user_id = %auth.user_id, "History entry removed");

    Ok(StatusCode::NO_CONTENT)
}
