//! Application configuration management.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file) and deserialized with `envy` into a typed struct.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("{name} is not a usable upstream URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{name} must be a positive number")]
    NotPositive { name: &'static str },
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `GITHUB_TOKEN` (optional): bearer token for the GitHub API; without it
///   the unauthenticated rate limit applies
/// - `GITHUB_API_URL` (optional): defaults to `https://api.github.com`
/// - `GITHUB_TIMEOUT_SECS` (optional): per-request timeout, defaults to 10
/// - `OPENAI_API_KEY` (required): credential for the completion service
/// - `OPENAI_BASE_URL` (optional): defaults to `https://api.openai.com/v1`
/// - `OPENAI_MODEL` (optional): defaults to `gpt-3.5-turbo`
/// - `COMPLETION_TIMEOUT_SECS` (optional): per-stage timeout, defaults to 60
/// - `README_MAX_CHARS` (optional): README truncation length, defaults to 8000
/// - `CONTRIBUTOR_LIMIT` (optional): contributors per analysis, defaults to 10
/// - `DEFAULT_KEY_LIMIT` (optional): usage limit of new keys, defaults to 100
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub github_token: Option<String>,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default = "default_github_timeout_secs")]
    pub github_timeout_secs: u64,

    pub openai_api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,

    #[serde(default = "default_readme_max_chars")]
    pub readme_max_chars: usize,

    #[serde(default = "default_contributor_limit")]
    pub contributor_limit: u32,

    #[serde(default = "default_key_limit")]
    pub default_key_limit: i32,
}

fn default_port() -> u16 {
    3000
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout_secs() -> u64 {
    10
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_completion_timeout_secs() -> u64 {
    60
}

fn default_readme_max_chars() -> usize {
    8000
}

fn default_contributor_limit() -> u32 {
    10
}

fn default_key_limit() -> i32 {
    100
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A missing `.env` file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable (`DATABASE_URL`,
    /// `OPENAI_API_KEY`) is missing, a value cannot be parsed, or an upstream
    /// base URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the upstream base URLs and the numeric limits.
    ///
    /// HTTPS is required; plain HTTP is accepted only for local hosts so a
    /// stub server can stand in during development.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_upstream_url("GITHUB_API_URL", &self.github_api_url)?;
        validate_upstream_url("OPENAI_BASE_URL", &self.openai_base_url)?;

        if self.contributor_limit == 0 {
            return Err(ConfigError::NotPositive {
                name: "CONTRIBUTOR_LIMIT",
            });
        }
        if self.default_key_limit <= 0 {
            return Err(ConfigError::NotPositive {
                name: "DEFAULT_KEY_LIMIT",
            });
        }

        Ok(())
    }

    pub fn github_timeout(&self) -> Duration {
        Duration::from_secs(self.github_timeout_secs)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// GitHub token, treating an empty value as absent.
    pub fn github_token(&self) -> Option<&str> {
        self.github_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

fn validate_upstream_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        name,
        reason: reason.to_string(),
    };

    let parsed = url::Url::parse(value).map_err(|_| invalid("invalid URL format"))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => match parsed.host_str() {
            Some("localhost") | Some("127.0.0.1") | Some("0.0.0.0") => Ok(()),
            _ => Err(invalid("HTTP is only allowed for localhost")),
        },
        _ => Err(invalid("URL must use HTTP or HTTPS")),
    }
}
