//! Session identity middleware.
//!
//! Identity is resolved once, at the boundary, into a single normalized
//! [`Identity`]. Handlers never look at cookies or headers themselves.
//!
//! 1. [`identity_middleware`] runs on every request: it reads a session token
//!    from the `session` cookie or an `Authorization: Bearer` header, hashes it
//!    and looks it up among unexpired sessions. A missing or unknown token
//!    simply yields an anonymous identity.
//! 2. [`require_session`] guards the session-only routes: it rejects anonymous
//!    requests with HTTP 401 and injects an [`AuthContext`].

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{app::AppState, error::AppError, services::ledger::hash_secret};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Who is making the request, if anyone.
///
/// Inserted into every request's extensions by [`identity_middleware`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity {
    pub user_id: Option<Uuid>,
}

/// Authentication context attached to session-protected requests.
///
/// Route handlers extract it with `Extension<AuthContext>` and use `user_id`
/// to scope every query to the caller's own rows.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
}

/// Resolve the session (if any) and attach an [`Identity`].
///
/// # Errors
///
/// Only a failing session lookup is an error (HTTP 500); an absent, unknown
/// or expired token is not.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token_hash = session_token(request.headers()).map(hash_secret);
    let user_id = match token_hash {
        Some(token_hash) => state.users.find_session_user(&token_hash).await?,
        None => None,
    };

    request.extensions_mut().insert(Identity { user_id });

    Ok(next.run(request).await)
}

/// Reject anonymous requests and attach an [`AuthContext`].
pub async fn require_session(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user_id = request
        .extensions()
        .get::<Identity>()
        .and_then(|identity| identity.user_id)
        .ok_or(AppError::Unauthenticated)?;

    request.extensions_mut().insert(AuthContext { user_id });

    Ok(next.run(request).await)
}

/// Session token from the `session` cookie, else from `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
        })
        .filter(|token| !token.is_empty())
}
