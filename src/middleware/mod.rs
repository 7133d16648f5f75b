//! HTTP middleware components.
//!
//! Middleware run before route handlers. Here they resolve who is calling
//! and short-circuit requests that need a session but have none.

/// Session identity resolution and the session guard
pub mod auth;
