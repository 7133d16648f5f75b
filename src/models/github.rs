//! Facts fetched from the GitHub REST API.
//!
//! Wire types mirror the subset of each GitHub response we read; the public
//! types are what the rest of the service works with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Repository metadata plus decoded README.
#[derive(Debug, Clone, Default)]
pub struct RepoInfo {
    pub owner: String,
    pub repo: String,
    pub html_url: String,
    pub stars: i64,
    pub forks: i64,
    pub description: String,
    pub language: String,
    pub readme: String,
    pub topics: Vec<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub default_branch: Option<String>,
    pub open_issues_count: i64,
    pub watchers_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    pub username: String,
    pub contributions: i64,
    pub avatar_url: String,
    pub profile_url: String,
}

/// Coarse classification of commits in the last 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitFrequency {
    Low,
    Moderate,
    Active,
    VeryActive,
}

impl CommitFrequency {
    /// `>50` very active, `>20` active, `>5` moderate, otherwise low.
    pub fn from_monthly_commits(commits: i64) -> Self {
        match commits {
            c if c > 50 => Self::VeryActive,
            c if c > 20 => Self::Active,
            c if c > 5 => Self::Moderate,
            _ => Self::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::Active => "active",
            Self::VeryActive => "very active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    pub total_commits: i64,
    pub last_month_commits: i64,
    pub open_issues: i64,
    pub closed_issues: i64,
    pub open_pull_requests: i64,
    pub merged_pull_requests: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_frequency: Option<CommitFrequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_date: Option<DateTime<Utc>>,
}

impl ActivityData {
    /// Length of the rolling window used for `last_month_commits`.
    pub const WINDOW_DAYS: i64 = 30;

    /// Derive activity counts from one page each of issues, pulls and commits.
    ///
    /// The issues endpoint also lists pull requests; those are skipped when
    /// counting issues. Commits are expected newest first.
    pub fn derive(
        issues: &[IssueItem],
        pulls: &[PullItem],
        commits: &[CommitItem],
        now: DateTime<Utc>,
    ) -> Self {
        let window_start = now - Duration::days(Self::WINDOW_DAYS);

        let last_month_commits = commits
            .iter()
            .filter(|c| c.committed_at().is_some_and(|at| at >= window_start))
            .count() as i64;

        let plain_issues = issues.iter().filter(|i| i.pull_request.is_none());
        let (mut open_issues, mut closed_issues) = (0, 0);
        for issue in plain_issues {
            match issue.state.as_str() {
                "open" => open_issues += 1,
                "closed" => closed_issues += 1,
                _ => {}
            }
        }

        Self {
            total_commits: commits.len() as i64,
            last_month_commits,
            open_issues,
            closed_issues,
            open_pull_requests: pulls.iter().filter(|p| p.state == "open").count() as i64,
            merged_pull_requests: pulls.iter().filter(|p| p.merged_at.is_some()).count() as i64,
            commit_frequency: Some(CommitFrequency::from_monthly_commits(last_month_commits)),
            last_commit_date: commits.first().and_then(CommitItem::committed_at),
        }
    }
}

// GitHub wire types

#[derive(Debug, Deserialize)]
pub(crate) struct RepoPayload {
    pub name: Option<String>,
    pub owner: Option<OwnerPayload>,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub license: Option<LicensePayload>,
    pub homepage: Option<String>,
    pub default_branch: Option<String>,
    #[serde(default)]
    pub open_issues_count: i64,
    #[serde(default)]
    pub watchers_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerPayload {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LicensePayload {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadmePayload {
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContributorPayload {
    pub login: String,
    pub contributions: i64,
    pub avatar_url: String,
    pub html_url: String,
}

impl From<ContributorPayload> for Contributor {
    fn from(payload: ContributorPayload) -> Self {
        Self {
            username: payload.login,
            contributions: payload.contributions,
            avatar_url: payload.avatar_url,
            profile_url: payload.html_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueItem {
    pub state: String,
    /// Present when the "issue" is actually a pull request
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullItem {
    pub state: String,
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub committer: Option<CommitSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitSignature {
    pub date: Option<DateTime<Utc>>,
}

impl CommitItem {
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.commit.committer.as_ref().and_then(|c| c.date)
    }
}
