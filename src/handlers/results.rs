//! Stored analysis lookup.

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::{
    app::AppState, error::AppError, middleware::auth::Identity,
    models::analysis::StoredAnalysisResponse,
};

/// Get the stored analysis of a repository.
///
/// # Endpoint
///
/// `GET /api/v1/results/{owner}/{repo}`
///
/// # Authentication
///
/// Optional. With a session, the repository is added to the caller's history
/// if it is not there yet. This endpoint never charges quota and never
/// triggers a new analysis.
///
/// # Response
///
/// - **Success (200 OK)**: stored fields plus `name`, `repoUrl`, `avatarUrl`,
///   `stars` and `analyzedAt`
/// - **Error (404)**: the repository has not been analyzed
pub async fn get_results(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<StoredAnalysisResponse>, AppError> {
    let response = state
        .analyzer
        .stored_result(&owner, &repo, identity.user_id)
        .await?;

    Ok(Json(response))
}
