//! In-memory store for tests.
//!
//! Every operation runs under a single mutex, which gives the same atomicity
//! guarantees the PostgreSQL store gets from conditional updates and unique
//! constraints.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::types::Json;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::analysis_log::{AnalysisLogRecord, NewAnalysisLogEntry};
use crate::models::api_key::{ApiKey, ApiKeyChanges, KeyUsage, NewApiKey};
use crate::models::repository::{
    HistoryRow, InsertOutcome, NewRepository, Repository, RepositoryIdentity,
};
use crate::models::user::{KeyTotals, User};
use crate::store::{AnalysisLogStore, ApiKeyStore, RepositoryStore, UserStore};

#[derive(Debug, Clone)]
struct Link {
    id: Uuid,
    user_id: Uuid,
    repository_id: Uuid,
    is_favorite: bool,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    keys: HashMap<Uuid, ApiKey>,
    /// Keyed by [`RepositoryIdentity::cache_key`]
    repositories: HashMap<(String, String), Repository>,
    facts: Vec<(Uuid, String)>,
    links: Vec<Link>,
    analysis_log: Vec<AnalysisLogRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_user(&self, email: &str) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: None,
            avatar_url: None,
            created_at: Utc::now(),
        };
        let id = user.id;
        self.lock().users.insert(id, user);
        id
    }

    /// Registers a session by token hash, valid for one day.
    pub fn add_session(&self, token_hash: &str, user_id: Uuid) {
        self.lock()
            .sessions
            .insert(token_hash.to_string(), (user_id, Utc::now() + Duration::days(1)));
    }

    pub fn add_expired_session(&self, token_hash: &str, user_id: Uuid) {
        self.lock()
            .sessions
            .insert(token_hash.to_string(), (user_id, Utc::now() - Duration::minutes(1)));
    }

    /// Stores a repository record directly, bypassing the analysis flow.
    pub fn seed_repository(&self, repository: Repository, facts: &[&str]) {
        let mut inner = self.lock();
        for fact in facts {
            inner.facts.push((repository.id, fact.to_string()));
        }
        let key = RepositoryIdentity::new(&repository.owner, &repository.repo_name).cache_key();
        inner.repositories.insert(key, repository);
    }

    pub fn repository_count(&self) -> usize {
        self.lock().repositories.len()
    }

    pub fn fact_count(&self, repository_id: Uuid) -> usize {
        self.lock()
            .facts
            .iter()
            .filter(|(id, _)| *id == repository_id)
            .count()
    }

    pub fn link_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .links
            .iter()
            .filter(|link| link.user_id == user_id)
            .count()
    }

    pub fn analysis_log_count(&self, user_id: Uuid) -> usize {
        self.lock()
            .analysis_log
            .iter()
            .filter(|record| record.user_id == user_id)
            .count()
    }

    pub fn usage_of(&self, key_id: Uuid) -> i32 {
        self.lock()
            .keys
            .get(&key_id)
            .map(|key| key.usage_count)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        Ok(self
            .lock()
            .keys
            .values()
            .find(|key| key.key_hash == key_hash && key.is_active)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        Ok(self.lock().keys.get(&id).cloned())
    }

    async fn try_charge(&self, id: Uuid) -> Result<Option<KeyUsage>, AppError> {
        let mut inner = self.lock();
        let Some(key) = inner.keys.get_mut(&id) else {
            return Ok(None);
        };
        if !key.is_active || !key.has_quota() {
            return Ok(None);
        }

        key.usage_count += 1;
        key.last_used_at = Some(Utc::now());

        Ok(Some(KeyUsage {
            usage_count: key.usage_count,
            usage_limit: key.usage_limit,
        }))
    }

    async fn insert(&self, key: NewApiKey) -> Result<ApiKey, AppError> {
        let mut inner = self.lock();
        if inner.keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(AppError::Internal("duplicate key hash".to_string()));
        }

        let key = ApiKey {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            name: key.name,
            key_hash: key.key_hash,
            key_prefix: key.key_prefix,
            usage_count: 0,
            usage_limit: key.usage_limit,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        };
        inner.keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let mut keys: Vec<ApiKey> = self
            .lock()
            .keys
            .values()
            .filter(|key| key.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        Ok(self
            .lock()
            .keys
            .get(&id)
            .filter(|key| key.user_id == user_id)
            .cloned())
    }

    async fn update_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: ApiKeyChanges,
    ) -> Result<Option<ApiKey>, AppError> {
        let mut inner = self.lock();
        let Some(key) = inner.keys.get_mut(&id).filter(|key| key.user_id == user_id) else {
            return Ok(None);
        };

        if let Some(limit) = changes.usage_limit {
            if limit < key.usage_count {
                return Err(AppError::InvalidRequest(
                    "Limit cannot be lower than the current usage".to_string(),
                ));
            }
            key.usage_limit = limit;
        }
        if let Some(name) = changes.name {
            key.name = name;
        }
        if let Some(is_active) = changes.is_active {
            key.is_active = is_active;
        }

        Ok(Some(key.clone()))
    }

    async fn delete_for_user(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let owned = inner.keys.get(&id).is_some_and(|key| key.user_id == user_id);
        if owned {
            inner.keys.remove(&id);
            // ON DELETE SET NULL
            for record in &mut inner.analysis_log {
                if record.api_key_id == Some(id) {
                    record.api_key_id = None;
                }
            }
        }
        Ok(owned)
    }

    async fn totals_for_user(&self, user_id: Uuid) -> Result<KeyTotals, AppError> {
        let inner = self.lock();
        let totals = inner
            .keys
            .values()
            .filter(|key| key.user_id == user_id)
            .fold(KeyTotals::default(), |mut totals, key| {
                totals.count += 1;
                totals.total_usage += i64::from(key.usage_count);
                totals.total_limit += i64::from(key.usage_limit);
                totals
            });
        Ok(totals)
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn find_by_identity(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<Repository>, AppError> {
        Ok(self.lock().repositories.get(&identity.cache_key()).cloned())
    }

    async fn facts(&self, repository_id: Uuid) -> Result<Vec<String>, AppError> {
        Ok(self
            .lock()
            .facts
            .iter()
            .filter(|(id, _)| *id == repository_id)
            .map(|(_, fact)| fact.clone())
            .collect())
    }

    async fn insert_analysis(&self, analysis: NewRepository) -> Result<InsertOutcome, AppError> {
        let mut inner = self.lock();
        let key = analysis.identity.cache_key();

        if let Some(existing) = inner.repositories.get(&key) {
            if existing.is_analyzed() {
                return Ok(InsertOutcome::AlreadyAnalyzed(existing.clone()));
            }
        }

        let id = inner
            .repositories
            .get(&key)
            .map(|existing| existing.id)
            .unwrap_or_else(Uuid::new_v4);
        let repository = Repository {
            id,
            owner: analysis.identity.owner.clone(),
            repo_name: analysis.identity.repo.clone(),
            github_url: analysis.github_url,
            summary: analysis.summary,
            purpose: analysis.purpose,
            technologies: analysis.technologies,
            structure: analysis.structure,
            stars: analysis.stars,
            analyzed_at: Utc::now(),
        };

        for fact in analysis.facts {
            if !inner.facts.iter().any(|(rid, f)| *rid == id && *f == fact) {
                inner.facts.push((id, fact));
            }
        }
        inner.repositories.insert(key, repository.clone());

        Ok(InsertOutcome::Inserted(repository))
    }

    async fn ensure_link(&self, user_id: Uuid, repository_id: Uuid) -> Result<(), AppError> {
        let mut inner = self.lock();
        let exists = inner
            .links
            .iter()
            .any(|link| link.user_id == user_id && link.repository_id == repository_id);
        if !exists {
            inner.links.push(Link {
                id: Uuid::new_v4(),
                user_id,
                repository_id,
                is_favorite: false,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<HistoryRow>, i64), AppError> {
        let inner = self.lock();
        let mut links: Vec<&Link> = inner
            .links
            .iter()
            .filter(|link| link.user_id == user_id)
            .collect();
        // newest first; insertion order breaks ties between equal timestamps
        links.reverse();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = links.len() as i64;
        let rows = links
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|link| {
                let repository = inner
                    .repositories
                    .values()
                    .find(|r| r.id == link.repository_id)?;
                Some(HistoryRow {
                    id: link.id,
                    is_favorite: link.is_favorite,
                    created_at: link.created_at,
                    repository_id: repository.id,
                    owner: repository.owner.clone(),
                    repo_name: repository.repo_name.clone(),
                    summary: repository.summary.clone(),
                    technologies: repository.technologies.clone(),
                    stars: repository.stars,
                    analyzed_at: repository.analyzed_at,
                })
            })
            .collect();

        Ok((rows, total))
    }

    async fn set_favorite(
        &self,
        user_id: Uuid,
        link_id: Uuid,
        is_favorite: bool,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        match inner
            .links
            .iter_mut()
            .find(|link| link.id == link_id && link.user_id == user_id)
        {
            Some(link) => {
                link.is_favorite = is_favorite;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_link(&self, user_id: Uuid, link_id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let before = inner.links.len();
        inner
            .links
            .retain(|link| !(link.id == link_id && link.user_id == user_id));
        Ok(inner.links.len() < before)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_session_user(&self, token_hash: &str) -> Result<Option<Uuid>, AppError> {
        Ok(self
            .lock()
            .sessions
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(user_id, _)| *user_id))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl AnalysisLogStore for MemoryStore {
    async fn record(&self, entry: NewAnalysisLogEntry) -> Result<Uuid, AppError> {
        let mut inner = self.lock();
        let record = AnalysisLogRecord {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            api_key_id: Some(entry.api_key_id),
            api_key_name: None,
            repo_owner: entry.repo_owner,
            repo_name: entry.repo_name,
            analysis_result: Json(entry.analysis_result),
            created_at: Utc::now(),
        };
        let id = record.id;
        inner.analysis_log.push(record);
        Ok(id)
    }

    async fn list(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AnalysisLogRecord>, i64), AppError> {
        let inner = self.lock();
        let mut records: Vec<AnalysisLogRecord> = inner
            .analysis_log
            .iter()
            .filter(|record| record.user_id == user_id)
            .rev()
            .map(|record| with_key_name(&inner, record))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len() as i64;
        let page = records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn find(&self, user_id: Uuid, id: Uuid) -> Result<Option<AnalysisLogRecord>, AppError> {
        let inner = self.lock();
        Ok(inner
            .analysis_log
            .iter()
            .find(|record| record.id == id && record.user_id == user_id)
            .map(|record| with_key_name(&inner, record)))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let before = inner.analysis_log.len();
        inner
            .analysis_log
            .retain(|record| !(record.id == id && record.user_id == user_id));
        Ok(inner.analysis_log.len() < before)
    }
}

/// The record with its key name resolved, as the Postgres join would.
fn with_key_name(inner: &Inner, record: &AnalysisLogRecord) -> AnalysisLogRecord {
    let mut record = record.clone();
    record.api_key_name = record
        .api_key_id
        .and_then(|id| inner.keys.get(&id))
        .map(|key| key.name.clone());
    record
}
