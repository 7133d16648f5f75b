//! API key ledger - issuing keys and metering their usage.
//!
//! # Quota Guarantees
//!
//! `usage_count` only changes through [`Ledger::increment`], which delegates
//! to the store's atomic conditional update. Concurrent charges against a key
//! with one unit left produce exactly one success.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_key::{
    ApiKey, ApiKeyChanges, CreateApiKeyRequest, KEY_LENGTH, KEY_PREFIX, KeyUsage, NewApiKey,
    UpdateApiKeyRequest,
};
use crate::models::user::KeyTotals;
use crate::store::ApiKeyStore;

/// Characters of the secret kept in `key_prefix` for display.
const DISPLAY_PREFIX_LEN: usize = 8;

/// SHA-256 hex digest of a key secret, as stored in `api_keys.key_hash`.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a presented key has the shape of an issued key.
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == KEY_LENGTH
        && raw.starts_with(KEY_PREFIX)
        && raw[KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit())
}

/// New secret: the key prefix followed by 16 random bytes in hex.
fn generate_secret() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("{}{}", KEY_PREFIX, hex::encode(bytes))
}

pub struct Ledger {
    keys: Arc<dyn ApiKeyStore>,
    default_limit: i32,
}

impl Ledger {
    pub fn new(keys: Arc<dyn ApiKeyStore>, default_limit: i32) -> Self {
        Self {
            keys,
            default_limit,
        }
    }

    /// Look up an active key by its secret.
    ///
    /// Malformed input is answered with `None` without touching the store.
    pub async fn validate(&self, raw: &str) -> Result<Option<ApiKey>, AppError> {
        let raw = raw.trim();
        if !is_well_formed(raw) {
            return Ok(None);
        }

        self.keys.find_active_by_hash(&hash_secret(raw)).await
    }

    /// Whether another unit may be charged, based on the key as last read.
    pub fn check_quota(key: &ApiKey) -> Result<(), AppError> {
        if key.has_quota() {
            Ok(())
        } else {
            Err(AppError::QuotaExceeded)
        }
    }

    /// Resolve a presented key and make sure it still has quota.
    ///
    /// # Errors
    ///
    /// - `InvalidApiKey`: key missing, malformed, unknown or inactive
    /// - `QuotaExceeded`: key is valid but used up
    pub async fn authorize(&self, raw: Option<&str>) -> Result<ApiKey, AppError> {
        let raw = raw.ok_or(AppError::InvalidApiKey)?;
        let key = self.validate(raw).await?.ok_or(AppError::InvalidApiKey)?;
        Self::check_quota(&key)?;
        Ok(key)
    }

    /// Charge one unit against a key.
    ///
    /// The quota is re-checked at the moment of the write, not taken from the
    /// previously read `key`.
    ///
    /// # Errors
    ///
    /// - `InvalidApiKey`: key was deleted or deactivated since it was read
    /// - `QuotaExceeded`: no quota left at the moment of the charge
    pub async fn increment(&self, key: &ApiKey) -> Result<KeyUsage, AppError> {
        if let Some(usage) = self.keys.try_charge(key.id).await? {
            tracing::debug!(
                key_id = %key.id,
                usage = usage.usage_count,
                limit = usage.usage_limit,
                "Charged API key"
            );
            return Ok(usage);
        }

        match self.keys.find_by_id(key.id).await? {
            Some(current) if current.is_active => {
                tracing::info!(key_id = %key.id, "API key quota exhausted");
                Err(AppError::QuotaExceeded)
            }
            _ => Err(AppError::InvalidApiKey),
        }
    }

    /// Validate a key and charge one unit for the check itself.
    pub async fn validate_and_charge(&self, raw: Option<&str>) -> Result<KeyUsage, AppError> {
        let key = self.authorize(raw).await?;
        self.increment(&key).await
    }

    /// Issue a new key. Returns the stored record and the plaintext secret.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: blank name or non-positive limit
    pub async fn create_key(
        &self,
        user_id: Uuid,
        request: CreateApiKeyRequest,
    ) -> Result<(ApiKey, String), AppError> {
        let name = validate_name(&request.name)?;
        let usage_limit = request.limit.unwrap_or(self.default_limit);
        validate_limit(usage_limit)?;

        let secret = generate_secret();
        let key = self
            .keys
            .insert(NewApiKey {
                user_id,
                name,
                key_hash: hash_secret(&secret),
                key_prefix: secret[..DISPLAY_PREFIX_LEN].to_string(),
                usage_limit,
            })
            .await?;

        tracing::info!(key_id = %key.id, user_id = %user_id, "API key created");

        Ok((key, secret))
    }

    pub async fn list_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        self.keys.list_for_user(user_id).await
    }

    pub async fn get_key(&self, user_id: Uuid, id: Uuid) -> Result<ApiKey, AppError> {
        self.keys
            .find_for_user(user_id, id)
            .await?
            .ok_or(AppError::ApiKeyNotFound)
    }

    /// Apply a partial update to one of the user's keys.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: no field given, blank name, non-positive limit, or
    ///   a limit below the current usage
    /// - `ApiKeyNotFound`: no such key for this user
    pub async fn update_key(
        &self,
        user_id: Uuid,
        id: Uuid,
        request: UpdateApiKeyRequest,
    ) -> Result<ApiKey, AppError> {
        if request.is_empty() {
            return Err(AppError::InvalidRequest(
                "At least one of name, limit or is_active must be provided".to_string(),
            ));
        }

        let name = request.name.as_deref().map(validate_name).transpose()?;

        if let Some(limit) = request.limit {
            validate_limit(limit)?;
            let current = self.get_key(user_id, id).await?;
            if limit < current.usage_count {
                return Err(AppError::InvalidRequest(format!(
                    "Limit cannot be lower than the current usage ({})",
                    current.usage_count
                )));
            }
        }

        let changes = ApiKeyChanges {
            name,
            usage_limit: request.limit,
            is_active: request.is_active,
        };

        self.keys
            .update_for_user(user_id, id, changes)
            .await?
            .ok_or(AppError::ApiKeyNotFound)
    }

    pub async fn delete_key(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        if !self.keys.delete_for_user(user_id, id).await? {
            return Err(AppError::ApiKeyNotFound);
        }
        tracing::info!(key_id = %id, user_id = %user_id, "API key deleted");
        Ok(())
    }

    pub async fn totals(&self, user_id: Uuid) -> Result<KeyTotals, AppError> {
        self.keys.totals_for_user(user_id).await
    }
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Key name is required".to_string()));
    }
    Ok(name.to_string())
}

fn validate_limit(limit: i32) -> Result<(), AppError> {
    if limit <= 0 {
        return Err(AppError::InvalidRequest(
            "Limit must be a positive number".to_string(),
        ));
    }
    Ok(())
}
