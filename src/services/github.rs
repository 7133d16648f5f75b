//! GitHub REST API fetcher.
//!
//! Only the repository lookup is fatal. Every other fetch degrades to an empty
//! value (logged at `warn`) so a partial GitHub outage still yields an analysis.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::models::github::{
    ActivityData, CommitItem, ContentItem, Contributor, ContributorPayload, IssueItem, PullItem,
    ReadmePayload, RepoInfo, RepoPayload,
};
use crate::models::repository::RepositoryIdentity;

/// Directories expanded one level in the structure listing, in priority order.
const IMPORTANT_DIRS: &[&str] = &["src", "app", "lib", "components"];
const MAX_EXPANDED_DIRS: usize = 3;

/// Root files called out as configuration in the structure listing.
const CONFIG_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "next.config.js",
    "tailwind.config.js",
    "Dockerfile",
    "docker-compose.yml",
    ".env.example",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Makefile",
];

/// Page size for the issues, pulls and commits requests.
const ACTIVITY_PAGE_SIZE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("repository not found or private")]
    NotFound,

    #[error("GitHub API rate limit exceeded")]
    RateLimited,

    #[error("GitHub request timed out")]
    Timeout,

    #[error("GitHub request failed: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for GithubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GithubError::Timeout
        } else {
            GithubError::Transient(err.to_string())
        }
    }
}

/// Read-only source of repository facts.
#[async_trait]
pub trait GithubSource: Send + Sync {
    /// Repository metadata plus decoded README (empty if there is none).
    async fn fetch_repo_info(&self, identity: &RepositoryIdentity)
    -> Result<RepoInfo, GithubError>;

    /// Language names, most bytes first. Empty on failure.
    async fn fetch_languages(&self, identity: &RepositoryIdentity) -> Vec<String>;

    /// Human-readable listing of the top-level layout. Empty on failure.
    async fn fetch_structure(&self, identity: &RepositoryIdentity) -> String;

    /// Top contributors by contribution count. Empty on failure.
    async fn fetch_contributors(
        &self,
        identity: &RepositoryIdentity,
        limit: u32,
    ) -> Vec<Contributor>;

    /// Issue, pull request and commit counts. All zero on failure.
    async fn fetch_activity(&self, identity: &RepositoryIdentity) -> ActivityData;
}

pub struct GithubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    /// Build a client against `base_url` (normally `https://api.github.com`).
    ///
    /// Without a token requests are sent unauthenticated and get GitHub's
    /// lower rate limit.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("repo-insight/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
        })
    }

    fn repo_url(&self, identity: &RepositoryIdentity, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url, identity.owner, identity.repo, suffix
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GithubError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(GithubError::NotFound);
        }
        if is_rate_limited(&response) {
            return Err(GithubError::RateLimited);
        }
        if !status.is_success() {
            return Err(GithubError::Transient(format!("{} returned {}", url, status)));
        }

        Ok(response.json::<T>().await?)
    }

    async fn fetch_readme(&self, identity: &RepositoryIdentity) -> String {
        let payload = match self
            .get_json::<ReadmePayload>(&self.repo_url(identity, "/readme"))
            .await
        {
            Ok(payload) => payload,
            Err(GithubError::NotFound) => {
                tracing::debug!(repo = %identity, "Repository has no README");
                return String::new();
            }
            Err(e) => {
                tracing::warn!(repo = %identity, "README fetch failed: {}", e);
                return String::new();
            }
        };

        decode_readme(&payload).unwrap_or_else(|| {
            tracing::warn!(repo = %identity, "README content could not be decoded");
            String::new()
        })
    }

    async fn list_contents(
        &self,
        identity: &RepositoryIdentity,
        path: &str,
    ) -> Result<Vec<ContentItem>, GithubError> {
        let suffix = if path.is_empty() {
            "/contents".to_string()
        } else {
            format!("/contents/{}", path)
        };
        self.get_json(&self.repo_url(identity, &suffix)).await
    }
}

fn is_rate_limited(response: &reqwest::Response) -> bool {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|remaining| remaining.trim() == "0"),
        _ => false,
    }
}

/// Decode the base64 README body. GitHub wraps the content at 60 columns.
fn decode_readme(payload: &ReadmePayload) -> Option<String> {
    if payload
        .encoding
        .as_deref()
        .is_some_and(|encoding| encoding != "base64")
    {
        return Some(payload.content.clone());
    }

    let compact: String = payload
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Language names ordered by byte count, largest first; ties by name.
fn rank_languages(bytes_by_language: HashMap<String, u64>) -> Vec<String> {
    let mut ranked: Vec<(String, u64)> = bytes_by_language.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().map(|(language, _)| language).collect()
}

fn split_contents(items: &[ContentItem]) -> (Vec<&str>, Vec<&str>) {
    let dirs = items
        .iter()
        .filter(|item| item.kind == "dir")
        .map(|item| item.name.as_str())
        .collect();
    let files = items
        .iter()
        .filter(|item| item.kind == "file")
        .map(|item| item.name.as_str())
        .collect();
    (dirs, files)
}

#[async_trait]
impl GithubSource for GithubClient {
    async fn fetch_repo_info(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<RepoInfo, GithubError> {
        let payload: RepoPayload = self.get_json(&self.repo_url(identity, "")).await?;
        let readme = self.fetch_readme(identity).await;

        Ok(RepoInfo {
            owner: payload
                .owner
                .map(|owner| owner.login)
                .unwrap_or_else(|| identity.owner.clone()),
            repo: payload.name.unwrap_or_else(|| identity.repo.clone()),
            html_url: payload.html_url,
            stars: payload.stargazers_count,
            forks: payload.forks_count,
            description: payload.description.unwrap_or_default(),
            language: payload
                .language
                .unwrap_or_else(|| "Not specified".to_string()),
            readme,
            topics: payload.topics,
            license: payload.license.and_then(|license| license.name),
            homepage: payload.homepage.filter(|h| !h.is_empty()),
            default_branch: payload.default_branch,
            open_issues_count: payload.open_issues_count,
            watchers_count: payload.watchers_count,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
        })
    }

    async fn fetch_languages(&self, identity: &RepositoryIdentity) -> Vec<String> {
        match self
            .get_json::<HashMap<String, u64>>(&self.repo_url(identity, "/languages"))
            .await
        {
            Ok(languages) => rank_languages(languages),
            Err(e) => {
                tracing::warn!(repo = %identity, "Language fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_structure(&self, identity: &RepositoryIdentity) -> String {
        let root = match self.list_contents(identity, "").await {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(repo = %identity, "Structure fetch failed: {}", e);
                return String::new();
            }
        };
        let (dirs, files) = split_contents(&root);

        let mut text = String::from("Project root:\n");
        if !dirs.is_empty() {
            text.push_str(&format!("- Directories: {}\n", dirs.join(", ")));
        }
        if !files.is_empty() {
            text.push_str(&format!("- Files: {}\n", files.join(", ")));

            let config: Vec<&str> = CONFIG_FILES
                .iter()
                .copied()
                .filter(|name| files.contains(name))
                .collect();
            if !config.is_empty() {
                text.push_str(&format!("\nConfiguration files:\n- {}\n", config.join(", ")));
            }
        }

        let expanded = IMPORTANT_DIRS
            .iter()
            .copied()
            .filter(|dir| dirs.contains(dir))
            .take(MAX_EXPANDED_DIRS);
        for dir in expanded {
            let items = match self.list_contents(identity, dir).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(repo = %identity, dir, "Directory listing failed: {}", e);
                    continue;
                }
            };
            let (sub_dirs, sub_files) = split_contents(&items);

            text.push_str(&format!("\n{}/ contents:\n", dir));
            if !sub_dirs.is_empty() {
                text.push_str(&format!("- Subdirectories: {}\n", sub_dirs.join(", ")));
            }
            if !sub_files.is_empty() {
                text.push_str(&format!("- Files: {}\n", sub_files.join(", ")));
            }
        }

        text
    }

    async fn fetch_contributors(
        &self,
        identity: &RepositoryIdentity,
        limit: u32,
    ) -> Vec<Contributor> {
        let url = self.repo_url(identity, &format!("/contributors?per_page={}", limit));
        match self.get_json::<Vec<ContributorPayload>>(&url).await {
            Ok(contributors) => contributors
                .into_iter()
                .take(limit as usize)
                .map(Contributor::from)
                .collect(),
            Err(e) => {
                tracing::warn!(repo = %identity, "Contributor fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch_activity(&self, identity: &RepositoryIdentity) -> ActivityData {
        let issues_url = self.repo_url(
            identity,
            &format!("/issues?state=all&per_page={}", ACTIVITY_PAGE_SIZE),
        );
        let pulls_url = self.repo_url(
            identity,
            &format!("/pulls?state=all&per_page={}", ACTIVITY_PAGE_SIZE),
        );
        let commits_url =
            self.repo_url(identity, &format!("/commits?per_page={}", ACTIVITY_PAGE_SIZE));

        let (issues, pulls, commits) = tokio::join!(
            self.get_json::<Vec<IssueItem>>(&issues_url),
            self.get_json::<Vec<PullItem>>(&pulls_url),
            self.get_json::<Vec<CommitItem>>(&commits_url),
        );

        match (issues, pulls, commits) {
            (Ok(issues), Ok(pulls), Ok(commits)) => {
                ActivityData::derive(&issues, &pulls, &commits, chrono::Utc::now())
            }
            (issues, pulls, commits) => {
                let error = issues
                    .err()
                    .or(pulls.err())
                    .or(commits.err())
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                tracing::warn!(repo = %identity, "Activity fetch failed: {}", error);
                ActivityData::default()
            }
        }
    }
}
