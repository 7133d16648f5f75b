//! API key model and key-management request/response types.
//!
//! Keys are metered credentials issued per user. Only the SHA-256 hash of the
//! secret is stored; the secret itself is returned once, when the key is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by every issued key.
pub const KEY_PREFIX: &str = "ghi_";

/// Length of a well-formed key: the prefix plus 32 hex characters.
pub const KEY_LENGTH: usize = KEY_PREFIX.len() + 32;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table. `usage_count <= usage_limit` is enforced by a
/// CHECK constraint, and `usage_count` is only ever changed by the ledger's
/// conditional increment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// User that owns this key
    pub user_id: Uuid,

    /// Display name chosen by the owner
    pub name: String,

    /// SHA-256 hash of the secret (64 hex characters)
    pub key_hash: String,

    /// First characters of the secret, kept for display in key listings
    pub key_prefix: String,

    pub usage_count: i32,
    pub usage_limit: i32,

    /// Inactive keys are rejected exactly like unknown keys
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Whether another unit of quota may be charged against this key.
    pub fn has_quota(&self) -> bool {
        self.usage_count < self.usage_limit
    }

    pub fn remaining(&self) -> i32 {
        (self.usage_limit - self.usage_count).max(0)
    }
}

/// Usage counters of a key right after a successful charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage {
    pub usage_count: i32,
    pub usage_limit: i32,
}

impl KeyUsage {
    pub fn remaining(&self) -> i32 {
        (self.usage_limit - self.usage_count).max(0)
    }
}

/// Request body for creating a new API key.
///
/// ```json
/// { "name": "CI pipeline", "limit": 500 }
/// ```
///
/// `limit` defaults to the configured default key limit.
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub limit: Option<i32>,
}

/// Request body for updating an API key. At least one field must be present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiKeyRequest {
    pub name: Option<String>,
    pub limit: Option<i32>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
}

impl UpdateApiKeyRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.limit.is_none() && self.is_active.is_none()
    }
}

/// Request body for the usage-check endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyRequest {
    #[serde(alias = "api_key")]
    pub api_key: Option<String>,
}

/// Response of the usage-check endpoint.
///
/// ```json
/// { "valid": true, "message": "API key is valid", "remaining": 41, "limit": 100 }
/// ```
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyResponse {
    pub valid: bool,
    pub message: String,
    pub remaining: i32,
    pub limit: i32,
}

/// API key as returned to its owner.
///
/// The `secret` field is only present in the response to key creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub name: String,
    pub key_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub usage_count: i32,
    pub usage_limit: i32,
    pub remaining: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            remaining: key.remaining(),
            name: key.name,
            key_prefix: key.key_prefix,
            secret: None,
            usage_count: key.usage_count,
            usage_limit: key.usage_limit,
            is_active: key.is_active,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
        }
    }
}

impl ApiKeyResponse {
    /// Attach the plaintext secret (only for the creation response).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Fields of a key to be inserted; `key_hash` is computed by the ledger.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub usage_limit: i32,
}

/// Validated changes for an existing key.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyChanges {
    pub name: Option<String>,
    pub usage_limit: Option<i32>,
    pub is_active: Option<bool>,
}
