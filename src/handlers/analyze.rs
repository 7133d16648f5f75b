//! Repository analysis endpoint.

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
};

use crate::{
    app::AppState,
    error::AppError,
    middleware::auth::Identity,
    models::analysis::{AnalysisResult, AnalyzeRepositoryRequest},
    services::analyzer::AnalyzeRequest,
};

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Analyze a GitHub repository.
///
/// # Endpoint
///
/// `POST /api/v1/analyze`
///
/// # Authentication
///
/// Either an API key (`X-API-Key` header or `apiKey` body field) or a
/// session. A keyed request is charged one unit of quota when it succeeds,
/// whether the result was cached or freshly computed.
///
/// # Request Body
///
/// ```json
/// { "url": "https://github.com/octocat/Hello-World" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: the analysis result; keyed requests also carry
///   `X-RateLimit-Limit` and `X-RateLimit-Remaining`
/// - **Error (400)**: URL is not a GitHub repository URL
/// - **Error (401)**: invalid key, or neither key nor session
/// - **Error (404)**: repository does not exist or is private
/// - **Error (429)**: key usage limit reached
/// - **Error (502)**: GitHub or the completion service failed
///
/// ```json
/// {
///   "summary": "...",
///   "purpose": "...",
///   "technologies": ["Rust", "Tokio"],
///   "structure": "Project root: ...",
///   "facts": ["..."],
///   "recommendationScore": 8
/// }
/// ```
pub async fn analyze_repository(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRepositoryRequest>,
) -> Result<(HeaderMap, Json<AnalysisResult>), AppError> {
    // header wins over the body field
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(request.api_key.as_deref())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let analysis = state
        .analyzer
        .analyze(AnalyzeRequest {
            url: &request.url,
            api_key,
            user_id: identity.user_id,
        })
        .await?;

    tracing::debug!(cached = analysis.cached, "Analyze request served");

    let mut response_headers = HeaderMap::new();
    if let Some(usage) = analysis.usage {
        response_headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(usage.usage_limit));
        response_headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(usage.remaining()));
    }

    Ok((response_headers, Json(analysis.result)))
}
