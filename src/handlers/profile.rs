//! Profile of the signed-in user.

use axum::{Extension, Json, extract::State};

use crate::{
    app::AppState, error::AppError, middleware::auth::AuthContext,
    models::user::ProfileResponse,
};

/// Get the caller's profile and key usage totals.
///
/// # Endpoint
///
/// `GET /api/v1/profile`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "user": { "id": "...", "email": "dev@example.com", "displayName": null },
///   "apiKeys": { "count": 2, "totalUsage": 17, "totalLimit": 200 }
/// }
/// ```
///
/// A session whose user no longer exists is treated as no session (401).
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .users
        .find_user(auth.user_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    let api_keys = state.ledger.totals(auth.user_id).await?;

    Ok(Json(ProfileResponse { user, api_keys }))
}
