//! Analysis orchestrator - the core request flow.
//!
//! ```text
//! KeyCheck -> CacheLookup -> hit:  Attach -> Charge -> Log
//!                         -> miss: Fetch -> Summarize -> Persist -> Attach -> Charge -> Log
//! ```
//!
//! # Charging
//!
//! A keyed request is charged exactly once, as the last step, after the
//! result is in hand and persisted. Any failure before that point (bad URL,
//! unknown repository, upstream outage, database error) leaves the key's
//! usage untouched.
//!
//! Keyed requests are then recorded in the analysis log. A failure to record
//! happens after the charge, so it is logged and the result is still served.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::analysis::{AnalysisResult, Baseline, StoredAnalysisResponse};
use crate::models::analysis_log::NewAnalysisLogEntry;
use crate::models::api_key::KeyUsage;
use crate::models::repository::{InsertOutcome, NewRepository, Repository, RepositoryIdentity};
use crate::services::github::{GithubError, GithubSource};
use crate::services::ledger::Ledger;
use crate::services::summarizer::{Summarizer, SummaryInput};
use crate::store::{AnalysisLogStore, RepositoryStore};

/// One analyze call as seen by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeRequest<'a> {
    pub url: &'a str,
    pub api_key: Option<&'a str>,
    /// Session user, if any
    pub user_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct Analysis {
    pub result: AnalysisResult,
    /// Counters after the charge; `None` for session-only requests
    pub usage: Option<KeyUsage>,
    pub cached: bool,
}

pub struct Analyzer {
    ledger: Arc<Ledger>,
    repositories: Arc<dyn RepositoryStore>,
    analysis_log: Arc<dyn AnalysisLogStore>,
    github: Arc<dyn GithubSource>,
    summarizer: Summarizer,
    contributor_limit: u32,
}

impl Analyzer {
    pub fn new(
        ledger: Arc<Ledger>,
        repositories: Arc<dyn RepositoryStore>,
        analysis_log: Arc<dyn AnalysisLogStore>,
        github: Arc<dyn GithubSource>,
        summarizer: Summarizer,
        contributor_limit: u32,
    ) -> Self {
        Self {
            ledger,
            repositories,
            analysis_log,
            github,
            summarizer,
            contributor_limit,
        }
    }

    /// Resolve or compute the analysis of a repository URL.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: URL is not `https://github.com/{owner}/{repo}`
    /// - `InvalidApiKey` / `QuotaExceeded`: key check failed
    /// - `Unauthenticated`: neither a key nor a session user
    /// - `RepositoryNotFound`: GitHub has no such (public) repository
    /// - `Upstream`: GitHub failed, or every summarization stage timed out
    /// - `Database`: store failure
    pub async fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<Analysis, AppError> {
        let identity = RepositoryIdentity::from_github_url(request.url).ok_or_else(|| {
            AppError::InvalidRequest(
                "URL must have the form https://github.com/{owner}/{repo}".to_string(),
            )
        })?;

        let key = match request.api_key {
            Some(raw) => Some(self.ledger.authorize(Some(raw)).await?),
            None => None,
        };
        if key.is_none() && request.user_id.is_none() {
            return Err(AppError::Unauthenticated);
        }

        let (repository, result, cached) = match self.lookup(&identity).await? {
            Some(repository) => {
                tracing::info!(repo = %identity, "Serving cached analysis");
                let facts = self.repositories.facts(repository.id).await?;
                let result = AnalysisResult::from_stored(&repository, facts);
                (repository, result, true)
            }
            None => {
                tracing::info!(repo = %identity, "No cached analysis, computing");
                self.compute(&identity).await?
            }
        };

        // keys are issued per user, so a keyed request links the key's owner
        let link_user = request.user_id.or(key.as_ref().map(|key| key.user_id));
        if let Some(user_id) = link_user {
            self.repositories
                .ensure_link(user_id, repository.id)
                .await?;
        }

        let usage = match &key {
            Some(key) => {
                let usage = self.ledger.increment(key).await?;
                self.record_keyed_analysis(key.user_id, key.id, &repository, &result)
                    .await;
                Some(usage)
            }
            None => None,
        };

        Ok(Analysis {
            result,
            usage,
            cached,
        })
    }

    /// Stored analysis for the results page. Never charges quota.
    ///
    /// # Errors
    ///
    /// - `RepositoryNotFound`: invalid identity or never analyzed
    pub async fn stored_result(
        &self,
        owner: &str,
        repo: &str,
        user_id: Option<Uuid>,
    ) -> Result<StoredAnalysisResponse, AppError> {
        let identity =
            RepositoryIdentity::from_github_url(&format!("https://github.com/{}/{}", owner, repo))
                .ok_or(AppError::RepositoryNotFound)?;

        let repository = self
            .lookup(&identity)
            .await?
            .ok_or(AppError::RepositoryNotFound)?;

        if let Some(user_id) = user_id {
            self.repositories
                .ensure_link(user_id, repository.id)
                .await?;
        }

        let facts = self.repositories.facts(repository.id).await?;
        Ok(StoredAnalysisResponse::new(&repository, facts))
    }

    async fn record_keyed_analysis(
        &self,
        user_id: Uuid,
        api_key_id: Uuid,
        repository: &Repository,
        result: &AnalysisResult,
    ) {
        let entry = NewAnalysisLogEntry {
            user_id,
            api_key_id,
            repo_owner: repository.owner.clone(),
            repo_name: repository.repo_name.clone(),
            analysis_result: result.clone(),
        };

        if let Err(e) = self.analysis_log.record(entry).await {
            tracing::error!(
                key_id = %api_key_id,
                repository_id = %repository.id,
                "Charged analysis could not be logged: {}",
                e
            );
        }
    }

    /// Analyzed record for an identity; unanalyzed rows count as a miss.
    async fn lookup(&self, identity: &RepositoryIdentity) -> Result<Option<Repository>, AppError> {
        Ok(self
            .repositories
            .find_by_identity(identity)
            .await?
            .filter(Repository::is_analyzed))
    }

    async fn compute(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<(Repository, AnalysisResult, bool), AppError> {
        let info = self
            .github
            .fetch_repo_info(identity)
            .await
            .map_err(|e| match e {
                GithubError::NotFound => AppError::RepositoryNotFound,
                other => AppError::Upstream(format!("GitHub lookup of {} failed: {}", identity, other)),
            })?;

        let (languages, structure, contributors, activity) = tokio::join!(
            self.github.fetch_languages(identity),
            self.github.fetch_structure(identity),
            self.github.fetch_contributors(identity, self.contributor_limit),
            self.github.fetch_activity(identity),
        );

        let summary = self
            .summarizer
            .summarize(SummaryInput {
                info: &info,
                languages: &languages,
                structure: &structure,
            })
            .await;
        if summary.timed_out {
            return Err(AppError::Upstream(format!(
                "every summarization stage timed out for {}",
                identity
            )));
        }
        if summary.enrichment.is_empty() {
            tracing::warn!(repo = %identity, "Summarization degraded, using baseline analysis");
        }

        let baseline = Baseline::from_facts(&info, &languages, &structure, contributors, activity);
        let result = AnalysisResult::merge(baseline, &summary.enrichment);

        // GitHub's spelling of the names, whatever casing the caller used
        let canonical = RepositoryIdentity::new(&info.owner, &info.repo);
        let outcome = self
            .repositories
            .insert_analysis(NewRepository {
                github_url: canonical.canonical_url(),
                identity: canonical,
                summary: result.summary.clone(),
                purpose: result.purpose.clone(),
                technologies: result.technologies.clone(),
                structure: result.structure.clone(),
                stars: info.stars,
                facts: result.facts.clone(),
            })
            .await?;

        match outcome {
            InsertOutcome::Inserted(repository) => {
                tracing::info!(repo = %identity, repository_id = %repository.id, "Analysis stored");
                Ok((repository, result, false))
            }
            InsertOutcome::AlreadyAnalyzed(repository) => {
                tracing::info!(repo = %identity, "Concurrent analysis won, serving its record");
                let facts = self.repositories.facts(repository.id).await?;
                let result = AnalysisResult::from_stored(&repository, facts);
                Ok((repository, result, true))
            }
        }
    }
}
