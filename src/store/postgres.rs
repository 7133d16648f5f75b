//! PostgreSQL implementation of the store traits.
//!
//! Concurrency-sensitive writes rely on the database rather than on
//! read-then-write sequences:
//! - quota charges are a single conditional `UPDATE ... WHERE usage_count < usage_limit`
//! - repository inserts and user links use `ON CONFLICT` on their unique keys
//!
//! Repository identities compare case-insensitively, matching the
//! `lower(owner), lower(repo_name)` unique index.

use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::{DbPool, is_unique_violation};
use crate::error::AppError;
use crate::models::analysis_log::{AnalysisLogRecord, NewAnalysisLogEntry};
use crate::models::api_key::{ApiKey, ApiKeyChanges, KeyUsage, NewApiKey};
use crate::models::repository::{
    HistoryRow, InsertOutcome, NewRepository, Repository, RepositoryIdentity,
};
use crate::models::user::{KeyTotals, User};
use crate::store::{AnalysisLogStore, ApiKeyStore, RepositoryStore, UserStore};

/// SQLSTATE for check_violation.
const CHECK_VIOLATION: &str = "23514";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    async fn try_charge(&self, id: Uuid) -> Result<Option<KeyUsage>, AppError> {
        // The row lock taken by UPDATE serializes concurrent charges; a waiting
        // charge re-evaluates the WHERE clause against the committed count.
        let usage = sqlx::query_as::<_, (i32, i32)>(
            r#"
            UPDATE api_keys
            SET usage_count = usage_count + 1,
                last_used_at = NOW()
            WHERE id = $1
              AND is_active = true
              AND usage_count < usage_limit
            RETURNING usage_count, usage_limit
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(usage.map(|(usage_count, usage_limit)| KeyUsage {
            usage_count,
            usage_limit,
        }))
    }

    async fn insert(&self, key: NewApiKey) -> Result<ApiKey, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (user_id, name, key_hash, key_prefix, usage_limit)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(key.user_id)
        .bind(&key.name)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(key.usage_limit)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn find_for_user(&self, user_id: Uuid, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        let key =
            sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(key)
    }

    async fn update_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
        changes: ApiKeyChanges,
    ) -> Result<Option<ApiKey>, AppError> {
        let result = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys
            SET name = COALESCE($3, name),
                usage_limit = COALESCE($4, usage_limit),
                is_active = COALESCE($5, is_active)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(changes.name)
        .bind(changes.usage_limit)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(key) => Ok(key),
            // usage grew past the requested limit between validation and write
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(CHECK_VIOLATION) => {
                Err(AppError::InvalidRequest(
                    "Limit cannot be lower than the current usage".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_for_user(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn totals_for_user(&self, user_id: Uuid) -> Result<KeyTotals, AppError> {
        let totals = sqlx::query_as::<_, KeyTotals>(
            r#"
            SELECT COUNT(*)::BIGINT AS count,
                   COALESCE(SUM(usage_count), 0)::BIGINT AS total_usage,
                   COALESCE(SUM(usage_limit), 0)::BIGINT AS total_limit
            FROM api_keys
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(totals)
    }
}

#[async_trait]
impl RepositoryStore for PgStore {
    async fn find_by_identity(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<Option<Repository>, AppError> {
        let repository = sqlx::query_as::<_, Repository>(
            "SELECT * FROM repositories WHERE lower(owner) = lower($1) AND lower(repo_name) = lower($2)",
        )
        .bind(&identity.owner)
        .bind(&identity.repo)
        .fetch_optional(&self.pool)
        .await?;

        Ok(repository)
    }

    async fn facts(&self, repository_id: Uuid) -> Result<Vec<String>, AppError> {
        let facts = sqlx::query_scalar::<_, String>(
            "SELECT fact FROM repository_facts WHERE repository_id = $1 ORDER BY id",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(facts)
    }

    async fn insert_analysis(&self, analysis: NewRepository) -> Result<InsertOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // A row left without a summary is completed by this insert; an analyzed
        // row is never overwritten and yields no RETURNING row.
        let inserted = sqlx::query_as::<_, Repository>(
            r#"
            INSERT INTO repositories (
                owner, repo_name, github_url, summary, purpose, technologies, structure, stars
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ((lower(owner)), (lower(repo_name))) DO UPDATE SET
                github_url = EXCLUDED.github_url,
                summary = EXCLUDED.summary,
                purpose = EXCLUDED.purpose,
                technologies = EXCLUDED.technologies,
                structure = EXCLUDED.structure,
                stars = EXCLUDED.stars,
                analyzed_at = NOW()
            WHERE repositories.summary = ''
            RETURNING *
            "#,
        )
        .bind(&analysis.identity.owner)
        .bind(&analysis.identity.repo)
        .bind(&analysis.github_url)
        .bind(&analysis.summary)
        .bind(&analysis.purpose)
        .bind(&analysis.technologies)
        .bind(&analysis.structure)
        .bind(analysis.stars)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(repository) = inserted else {
            tx.rollback().await?;
            let existing = self
                .find_by_identity(&analysis.identity)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "repository {} conflicted but could not be re-read",
                        analysis.identity
                    ))
                })?;
            return Ok(InsertOutcome::AlreadyAnalyzed(existing));
        };

        sqlx::query(
            r#"
            INSERT INTO repository_facts (repository_id, fact)
            SELECT $1, f.fact
            FROM UNNEST($2::TEXT[]) WITH ORDINALITY AS f(fact, ord)
            ORDER BY f.ord
            ON CONFLICT (repository_id, fact) DO NOTHING
            "#,
        )
        .bind(repository.id)
        .bind(&analysis.facts)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(InsertOutcome::Inserted(repository))
    }

    async fn ensure_link(&self, user_id: Uuid, repository_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_repositories (user_id, repository_id, is_favorite)
            VALUES ($1, $2, false)
            ON CONFLICT (user_id, repository_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(repository_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<HistoryRow>, i64), AppError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT ur.id, ur.is_favorite, ur.created_at,
                   r.id AS repository_id, r.owner, r.repo_name, r.summary,
                   r.technologies, r.stars, r.analyzed_at
            FROM user_repositories ur
            JOIN repositories r ON r.id = ur.repository_id
            WHERE ur.user_id = $1
            ORDER BY ur.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_repositories WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((rows, total))
    }

    async fn set_favorite(
        &self,
        user_id: Uuid,
        link_id: Uuid,
        is_favorite: bool,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE user_repositories SET is_favorite = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(link_id)
        .bind(user_id)
        .bind(is_favorite)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_link(&self, user_id: Uuid, link_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM user_repositories WHERE id = $1 AND user_id = $2")
            .bind(link_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_session_user(&self, token_hash: &str) -> Result<Option<Uuid>, AppError> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM sessions WHERE token_hash = $1 AND expires_at > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, avatar_url, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const ANALYSIS_LOG_SELECT: &str = r#"
    SELECT h.id, h.user_id, h.api_key_id, k.name AS api_key_name,
           h.repo_owner, h.repo_name, h.analysis_result, h.created_at
    FROM analysis_history h
    LEFT JOIN api_keys k ON k.id = h.api_key_id
"#;

#[async_trait]
impl AnalysisLogStore for PgStore {
    async fn record(&self, entry: NewAnalysisLogEntry) -> Result<Uuid, AppError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO analysis_history (user_id, api_key_id, repo_owner, repo_name, analysis_result)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.api_key_id)
        .bind(&entry.repo_owner)
        .bind(&entry.repo_name)
        .bind(Json(&entry.analysis_result))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AnalysisLogRecord>, i64), AppError> {
        let records = sqlx::query_as::<_, AnalysisLogRecord>(&format!(
            "{ANALYSIS_LOG_SELECT} WHERE h.user_id = $1 ORDER BY h.created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analysis_history WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((records, total))
    }

    async fn find(&self, user_id: Uuid, id: Uuid) -> Result<Option<AnalysisLogRecord>, AppError> {
        let record = sqlx::query_as::<_, AnalysisLogRecord>(&format!(
            "{ANALYSIS_LOG_SELECT} WHERE h.id = $1 AND h.user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM analysis_history WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// These run against a real database:
/// `DATABASE_URL=postgres://... cargo test -- --ignored`.
///
/// Each test creates its own users and repository names, so they can share a
/// database and run in parallel.
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db;
    use crate::models::analysis::AnalysisResult;
    use crate::models::repository::RepositoryIdentity;

    async fn connect() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::create_pool(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        PgStore::new(pool)
    }

    async fn new_user(store: &PgStore) -> Uuid {
        sqlx::query_scalar("INSERT INTO users (email) VALUES ($1) RETURNING id")
            .bind(format!("{}@example.test", Uuid::new_v4()))
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    async fn new_key(store: &PgStore, user_id: Uuid, limit: i32, used: i32) -> ApiKey {
        let key = store
            .insert(NewApiKey {
                user_id,
                name: "ci".to_string(),
                key_hash: Uuid::new_v4().simple().to_string(),
                key_prefix: "ghi_test".to_string(),
                usage_limit: limit,
            })
            .await
            .unwrap();

        sqlx::query("UPDATE api_keys SET usage_count = $2 WHERE id = $1")
            .bind(key.id)
            .bind(used)
            .execute(&store.pool)
            .await
            .unwrap();

        key
    }

    fn unique_identity() -> RepositoryIdentity {
        RepositoryIdentity::new("octocat", format!("repo-{}", Uuid::new_v4().simple()))
    }

    fn new_repository(identity: &RepositoryIdentity, facts: &[&str]) -> NewRepository {
        NewRepository {
            identity: identity.clone(),
            github_url: format!("https://github.com/{}/{}", identity.owner, identity.repo),
            summary: "A greeting library.".to_string(),
            purpose: "Says hello.".to_string(),
            technologies: vec!["Rust".to_string()],
            structure: "Project root: src".to_string(),
            stars: 42,
            facts: facts.iter().map(|fact| fact.to_string()).collect(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn concurrent_charges_on_the_last_unit_admit_one() {
        let store = Arc::new(connect().await);
        let user_id = new_user(&store).await;
        let key_id = new_key(&store, user_id, 5, 4).await.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.try_charge(key_id).await })
            })
            .collect();

        let mut charged = Vec::new();
        for handle in handles {
            if let Some(usage) = handle.await.unwrap().unwrap() {
                charged.push(usage);
            }
        }

        assert_eq!(charged.len(), 1);
        assert_eq!(charged[0].usage_count, 5);
        assert_eq!(charged[0].remaining(), 0);

        let stored = store.find_by_id(key_id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 5);
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn inactive_key_is_never_charged() {
        let store = connect().await;
        let user_id = new_user(&store).await;
        let key = new_key(&store, user_id, 5, 0).await;

        store
            .update_for_user(
                user_id,
                key.id,
                ApiKeyChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.try_charge(key.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn concurrent_first_analyses_keep_one_record() {
        let store = Arc::new(connect().await);
        let identity = unique_identity();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let analysis = new_repository(&identity, &["first fact"]);
                tokio::spawn(async move { store.insert_analysis(analysis).await })
            })
            .collect();

        let mut inserted = Vec::new();
        let mut existing = Vec::new();
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                InsertOutcome::Inserted(repository) => inserted.push(repository),
                InsertOutcome::AlreadyAnalyzed(repository) => existing.push(repository),
            }
        }

        assert_eq!(inserted.len(), 1);
        assert_eq!(existing.len(), 1);
        assert_eq!(inserted[0].id, existing[0].id);

        let rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM repositories WHERE lower(repo_name) = lower($1)",
        )
        .bind(&identity.repo)
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(store.facts(inserted[0].id).await.unwrap(), vec!["first fact"]);
    }

    #[tokio::test]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn identities_differing_in_case_share_a_record() {
        let store = connect().await;
        let identity = unique_identity();
        let shouted = RepositoryIdentity::new(
            identity.owner.to_uppercase(),
            identity.repo.to_uppercase(),
        );

        let InsertOutcome::Inserted(first) = store
            .insert_analysis(new_repository(&identity, &[]))
            .await
            .unwrap()
        else {
            panic!("first insert should create the record");
        };

        match store
            .insert_analysis(new_repository(&shouted, &[]))
            .await
            .unwrap()
        {
            InsertOutcome::AlreadyAnalyzed(existing) => {
                assert_eq!(existing.id, first.id);
                assert_eq!(existing.repo_name, identity.repo);
            }
            InsertOutcome::Inserted(_) => panic!("case variant created a second record"),
        }

        let found = store.find_by_identity(&shouted).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn facts_keep_insertion_order_without_duplicates() {
        let store = connect().await;
        let identity = unique_identity();

        let outcome = store
            .insert_analysis(new_repository(
                &identity,
                &["zeta", "alpha", "zeta", "mid", "alpha"],
            ))
            .await
            .unwrap();
        let InsertOutcome::Inserted(repository) = outcome else {
            panic!("expected a new record");
        };

        assert_eq!(
            store.facts(repository.id).await.unwrap(),
            vec!["zeta", "alpha", "mid"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn repeated_links_create_one_history_entry() {
        let store = Arc::new(connect().await);
        let user_id = new_user(&store).await;
        let InsertOutcome::Inserted(repository) = store
            .insert_analysis(new_repository(&unique_identity(), &[]))
            .await
            .unwrap()
        else {
            panic!("expected a new record");
        };

        let repository_id = repository.id;

        store.ensure_link(user_id, repository_id).await.unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.ensure_link(user_id, repository_id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let (rows, total) = store.history(user_id, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].repository_id, repository_id);
        assert!(!rows[0].is_favorite);
    }

    #[tokio::test]
    #[ignore = "needs PostgreSQL in DATABASE_URL"]
    async fn analysis_log_outlives_its_key() {
        let store = connect().await;
        let user_id = new_user(&store).await;
        let other_user = new_user(&store).await;
        let key = new_key(&store, user_id, 10, 0).await;
        let result = AnalysisResult {
            summary: "A greeting library.".to_string(),
            ..Default::default()
        };

        let id = store
            .record(NewAnalysisLogEntry {
                user_id,
                api_key_id: key.id,
                repo_owner: "octocat".to_string(),
                repo_name: "Hello-World".to_string(),
                analysis_result: result.clone(),
            })
            .await
            .unwrap();

        let entry = store.find(user_id, id).await.unwrap().unwrap();
        assert_eq!(entry.api_key_name.as_deref(), Some("ci"));
        assert_eq!(entry.analysis_result.0, result);
        assert!(store.find(other_user, id).await.unwrap().is_none());

        assert!(store.delete_for_user(user_id, key.id).await.unwrap());

        let (entries, total) = store.list(user_id, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].api_key_id, None);
        assert_eq!(entries[0].api_key_name, None);

        assert!(!store.delete(other_user, id).await.unwrap());
        assert!(store.delete(user_id, id).await.unwrap());
        assert!(store.find(user_id, id).await.unwrap().is_none());
    }
}
