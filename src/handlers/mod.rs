//! HTTP request handlers (route handlers).
//!
//! Each handler extracts request data, delegates to a service or store, and
//! maps the outcome to a JSON response or an [`AppError`](crate::error::AppError).

/// Per-key analysis log
pub mod analysis_log;
/// Repository analysis
pub mod analyze;
/// Service health
pub mod health;
/// Dashboard history
pub mod history;
/// API key management and validation
pub mod keys;
/// Signed-in user profile
pub mod profile;
/// Stored analysis lookup
pub mod results;
