//! Per-key analysis log handlers.
//!
//! - GET /api/v1/analysis-history - Paginated list, newest first
//! - GET /api/v1/analysis-history/{id} - One entry with the result served
//! - DELETE /api/v1/analysis-history/{id} - Remove an entry
//!
//! Entries are written by keyed analyze requests; there is no create route.

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
    models::{
        analysis_log::{AnalysisLogDetail, AnalysisLogResponse, AnalysisLogSummary},
        repository::{HistoryQuery, Pagination},
    },
};

/// List the caller's keyed analyses.
///
/// # Endpoint
///
/// `GET /api/v1/analysis-history?page=1&limit=10`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "history": [
///     {
///       "id": "...",
///       "repoOwner": "octocat",
///       "repoName": "Hello-World",
///       "apiKeyId": "...",
///       "apiKeyName": "ci",
///       "createdAt": "..."
///     }
///   ],
///   "pagination": { "page": 1, "limit": 10, "totalItems": 1, "totalPages": 1 }
/// }
/// ```
///
/// `apiKeyId` and `apiKeyName` are null once the key was deleted.
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<AnalysisLogResponse>, AppError> {
    let (page, limit) = query.normalized();
    let offset = (page - 1) * limit;

    let (rows, total) = state.analysis_log.list(auth.user_id, limit, offset).await?;

    Ok(Json(AnalysisLogResponse {
        history: rows.into_iter().map(AnalysisLogSummary::from).collect(),
        pagination: Pagination::new(page, limit, total),
    }))
}

/// Get one log entry, including the analysis that was served.
///
/// # Endpoint
///
/// `GET /api/v1/analysis-history/{id}`
pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisLogDetail>, AppError> {
    let record = state
        .analysis_log
        .find(auth.user_id, id)
        .await?
        .ok_or(AppError::HistoryEntryNotFound)?;

    Ok(Json(record.into()))
}

/// `DELETE /api/v1/analysis-history/{id}`; 204 on success, 404 otherwise.
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.analysis_log.delete(auth.user_id, id).await? {
        return Err(AppError::HistoryEntryNotFound);
    }

    tracing::info!(entry_id = %id, user_id = %auth.user_id, "Analysis log entry removed");

    Ok(StatusCode::NO_CONTENT)
}
