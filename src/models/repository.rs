//! Repository analysis records, their facts, and per-user history links.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static GITHUB_REPO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([A-Za-z0-9_-]+)/([A-Za-z0-9_.-]+)/?$")
        .expect("repository URL pattern is valid")
});

/// The (owner, repo_name) pair identifying a repository. This is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub repo: String,
}

impl RepositoryIdentity {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse a URL of the exact form `https://github.com/{owner}/{repo}`.
    ///
    /// A single trailing slash is tolerated. Anything else (other hosts, extra
    /// path segments, query strings) is rejected.
    pub fn from_github_url(url: &str) -> Option<Self> {
        let captures = GITHUB_REPO_URL.captures(url.trim())?;
        let owner = captures.get(1)?.as_str();
        let repo = captures.get(2)?.as_str();

        if repo == "." || repo == ".." {
            return None;
        }

        Some(Self::new(owner, repo))
    }

    /// Case-folded form used for cache lookups; GitHub names are
    /// case-insensitive.
    pub fn cache_key(&self) -> (String, String) {
        (self.owner.to_ascii_lowercase(), self.repo.to_ascii_lowercase())
    }

    pub fn canonical_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Represents an analyzed repository from the `repositories` table.
///
/// A record with a non-empty `summary` is considered analyzed; requests for
/// the same identity are served from it instead of recomputing.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Repository {
    pub id: Uuid,
    pub owner: String,
    pub repo_name: String,
    pub github_url: String,
    pub summary: String,
    pub purpose: String,
    pub technologies: Vec<String>,
    pub structure: String,
    pub stars: i64,
    pub analyzed_at: DateTime<Utc>,
}

impl Repository {
    pub fn is_analyzed(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

/// Fields of a freshly computed analysis to be persisted.
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub identity: RepositoryIdentity,
    pub github_url: String,
    pub summary: String,
    pub purpose: String,
    pub technologies: Vec<String>,
    pub structure: String,
    pub stars: i64,
    pub facts: Vec<String>,
}

/// Outcome of persisting a new analysis.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// This request created (or completed) the record.
    Inserted(Repository),
    /// Another request analyzed the same identity first; this is its record.
    AlreadyAnalyzed(Repository),
}

/// One row of a user's analysis history (link joined with its repository).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub repository_id: Uuid,
    pub owner: String,
    pub repo_name: String,
    pub summary: String,
    pub technologies: Vec<String>,
    pub stars: i64,
    pub analyzed_at: DateTime<Utc>,
}

/// History entry as shown on the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub repo_owner: String,
    pub repo_name: String,
    pub avatar_url: String,
    pub description: String,
    pub language: String,
    pub stars: i64,
    pub created_at: DateTime<Utc>,
    pub analyzed_at: DateTime<Utc>,
    pub is_favorite: bool,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            repo_id: row.repository_id,
            avatar_url: format!("https://github.com/{}.png", row.owner),
            language: row
                .technologies
                .first()
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            repo_owner: row.owner,
            repo_name: row.repo_name,
            description: row.summary,
            stars: row.stars,
            created_at: row.created_at,
            analyzed_at: row.analyzed_at,
            is_favorite: row.is_favorite,
        }
    }
}

/// Query parameters for the history listing.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;
    /// Largest page whose offset, `(page - 1) * limit`, fits in an `i64`.
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_LIMIT;

    /// Normalized (page, limit): 1 <= page <= MAX_PAGE, 1 <= limit <= MAX_LIMIT.
    pub fn normalized(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, Self::MAX_PAGE);
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (page, limit)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total_items: i64) -> Self {
        Self {
            page,
            limit,
            total_items,
            total_pages: (total_items + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    #[serde(alias = "is_favorite")]
    pub is_favorite: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteResponse {
    pub id: Uuid,
    pub is_favorite: bool,
}
