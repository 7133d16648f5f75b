//! Persistence interfaces.
//!
//! Services depend on these traits rather than on a connection pool, so the
//! same orchestration runs against PostgreSQL in production and against the
//! in-memory store in tests.
//!
//! # Implementations
//!
//! - [`postgres::PgStore`] - PostgreSQL via sqlx
//! - `memory::MemoryStore` - in-memory, test builds only

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::analysis_log::{AnalysisLogRecord, NewAnalysisLogEntry};
use crate::models::api_key::{ApiKey, ApiKeyChanges, KeyUsage, NewApiKey};
use crate::models::repository::{
    HistoryRow, InsertOutcome, NewRepository, Repository, RepositoryIdentity,
};
use crate::models::user::{KeyTotals, User};

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// Storage for API keys and their usage counters.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Finds an active key by the SHA-256 hash of its secret.
    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError>;

    /// Finds a key by ID regardless of owner or state.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, AppError>;

    /// Increments `usage_count` by one if the key is active and below its limit.
    ///
    /// The check and the write happen as one atomic operation. Returns `None`
    /// when the condition did not hold at the moment of the write.
    async fn try_charge(&self, id: Uuid) -> Result<Option<KeyUsage>, AppError>;

    async fn insert(&self, key: NewApiKey) -> Result<ApiKey, AppError>;

    /// Lists a user's keys, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError>;

    async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> Result<Option<ApiKey>, AppError>;

    /// Applies changes to a key owned by `user_id`. `None` if no such key.
    async fn update_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: ApiKeyChanges,
    ) -> Result<Option<ApiKey>, AppError>;

    /// Hard-deletes a key owned by `user_id`. `false` if no such key.
    async fn delete_for_user(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    async fn totals_for_user(&self, user_id: Uuid) -> Result<KeyTotals, AppError>;
}

/// Storage for analyzed repositories, their facts, and user links.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_by_identity(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<Repository>, AppError>;

    /// Facts of a repository in insertion order.
    async fn facts(&self, repository_id: Uuid) -> Result<Vec<String>, AppError>;

    /// Persists a new analysis together with its facts.
    ///
    /// Guarded by the (owner, repo_name) uniqueness constraint: if another
    /// request already stored an analyzed record for the identity, nothing is
    /// written and that record is returned as [`InsertOutcome::AlreadyAnalyzed`].
    async fn insert_analysis(&self, analysis: NewRepository) -> Result<InsertOutcome, AppError>;

    /// Creates the (user, repository) link if it does not exist yet.
    ///
    /// Idempotent under concurrency; an existing link is left untouched.
    async fn ensure_link(&self, user_id: Uuid, repository_id: Uuid) -> Result<(), AppError>;

    /// One page of a user's history, newest first, plus the total count.
    async fn history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<HistoryRow>, i64), AppError>;

    /// `false` if the link does not exist or belongs to another user.
    async fn set_favorite(
        &self,
        user_id: Uuid,
        link_id: Uuid,
        is_favorite: bool,
    ) -> Result<bool, AppError>;

    /// Removes a history link (the repository record stays).
    async fn delete_link(&self, user_id: Uuid, link_id: Uuid) -> Result<bool, AppError>;
}

/// Read access to users and the sessions issued by the sign-in flow.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// User ID of an unexpired session, looked up by token hash.
    async fn find_session_user(&self, token_hash: &str) -> Result<Option<Uuid>, AppError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Verifies the backing store is reachable.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Storage for the per-key analysis log.
#[async_trait]
pub trait AnalysisLogStore: Send + Sync {
    async fn record(&self, entry: NewAnalysisLogEntry) -> Result<Uuid, AppError>;

    /// One page of a user's log, newest first, plus the total count.
    async fn list(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AnalysisLogRecord>, i64), AppError>;

    async fn find(&self, user_id: Uuid, id: Uuid) -> Result<Option<AnalysisLogRecord>, AppError>;

    /// `false` if the entry does not exist or belongs to another user.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;
}
