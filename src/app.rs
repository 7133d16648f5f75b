//! Shared application state and the HTTP router.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::{
    handlers,
    middleware::auth::{identity_middleware, require_session},
    services::{analyzer::Analyzer, ledger::Ledger},
    store::{AnalysisLogStore, RepositoryStore, UserStore},
};

/// Collaborators shared by every request.
///
/// Built once at startup and cloned per request; clones share the same
/// underlying clients and stores.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub ledger: Arc<Ledger>,
    pub repositories: Arc<dyn RepositoryStore>,
    pub analysis_log: Arc<dyn AnalysisLogStore>,
    pub users: Arc<dyn UserStore>,
}

/// Build the router.
///
/// # Routes
///
/// Public (session optional):
/// - `GET /health`
/// - `POST /api/v1/analyze` (API key or session)
/// - `POST /api/v1/keys/validate`
/// - `GET /api/v1/results/{owner}/{repo}`
///
/// Session required:
/// - `POST|GET /api/v1/keys`, `GET|PUT|DELETE /api/v1/keys/{id}`
/// - `GET /api/v1/history`, `PUT /api/v1/history/{id}/favorite`,
///   `DELETE /api/v1/history/{id}`
/// - `GET /api/v1/analysis-history`, `GET|DELETE /api/v1/analysis-history/{id}`
/// - `GET /api/v1/profile`
pub fn router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route(
            "/api/v1/keys",
            post(handlers::keys::create_key).get(handlers::keys::list_keys),
        )
        .route(
            "/api/v1/keys/{id}",
            get(handlers::keys::get_key)
                .put(handlers::keys::update_key)
                .delete(handlers::keys::delete_key),
        )
        .route("/api/v1/history", get(handlers::history::list_history))
        .route(
            "/api/v1/history/{id}/favorite",
            put(handlers::history::set_favorite),
        )
        .route(
            "/api/v1/history/{id}",
            axum::routing::delete(handlers::history::delete_entry),
        )
        .route(
            "/api/v1/analysis-history",
            get(handlers::analysis_log::list_entries),
        )
        .route(
            "/api/v1/analysis-history/{id}",
            get(handlers::analysis_log::get_entry).delete(handlers::analysis_log::delete_entry),
        )
        .route("/api/v1/profile", get(handlers::profile::get_profile))
        .route_layer(axum_middleware::from_fn(require_session));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/analyze",
            post(handlers::analyze::analyze_repository),
        )
        .route(
            "/api/v1/keys/validate",
            post(handlers::keys::validate_key),
        )
        .route(
            "/api/v1/results/{owner}/{repo}",
            get(handlers::results::get_results),
        )
        .merge(session_routes)
        // Resolve the caller once for every route
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            identity_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
