//! Data models representing database entities and API payloads.

/// Analysis result shapes and summarization stage outputs
pub mod analysis;
/// Per-key log of served analyses
pub mod analysis_log;
/// API key model
pub mod api_key;
/// GitHub facts and wire types
pub mod github;
/// Repository records and history links
pub mod repository;
/// Users and profiles
pub mod user;
