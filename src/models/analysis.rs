//! Analysis result shapes.
//!
//! A served result is always built from two parts: a [`Baseline`] derived only
//! from fetched GitHub facts, and an optional [`Enrichment`] produced by the
//! summarization stages. [`AnalysisResult::merge`] combines them with a fixed
//! precedence: an enrichment field replaces the baseline field only when it is
//! present and non-empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::github::{ActivityData, Contributor, RepoInfo};
use crate::models::repository::Repository;

/// Public analysis result returned to callers.
///
/// The first five fields are always present; the rest are omitted when the
/// summarization engine could not compute them (or when the result is served
/// from the stored record).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub purpose: String,
    pub technologies: Vec<String>,
    pub structure: String,
    pub facts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool_facts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_status: Option<DevelopmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complexity: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_practices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity_assessment: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strengths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weaknesses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<Contributor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_data: Option<ActivityData>,
}

/// Development status classification from the README stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevelopmentStatus {
    Active,
    Maintained,
    Experimental,
    Deprecated,
    Unknown,
}

/// Three-step classification used for setup and code complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

/// Output of the README analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeAnalysis {
    pub summary: String,
    pub purpose: String,
    pub features: Vec<String>,
    pub technologies: Vec<String>,
    pub interesting_facts: Vec<String>,
    pub development_status: DevelopmentStatus,
    pub setup_complexity: Level,
}

/// Output of the structure analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureAnalysis {
    pub architecture: String,
    pub code_organization: String,
    pub best_practices: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub complexity: Level,
    pub main_components: Vec<String>,
}

/// Output of the comprehensive synthesis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synthesis {
    pub overall_summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub use_cases: Vec<String>,
    pub community_activity: String,
    pub maintenance_quality: String,
    pub learning_value: String,
    pub recommendation_score: u8,
    pub conclusion: String,
}

/// Whatever the summarization stages managed to compute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub readme: Option<ReadmeAnalysis>,
    pub structure: Option<StructureAnalysis>,
    pub synthesis: Option<Synthesis>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.readme.is_none() && self.structure.is_none() && self.synthesis.is_none()
    }
}

/// Minimal analysis derived purely from fetched facts.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub summary: String,
    pub purpose: String,
    pub technologies: Vec<String>,
    pub structure: String,
    pub facts: Vec<String>,
    pub contributors: Vec<Contributor>,
    pub activity: ActivityData,
}

impl Baseline {
    pub fn from_facts(
        info: &RepoInfo,
        languages: &[String],
        structure: &str,
        contributors: Vec<Contributor>,
        activity: ActivityData,
    ) -> Self {
        let name = format!("{}/{}", info.owner, info.repo);
        let description = info.description.trim();
        let subject = if description.is_empty() {
            info.repo.as_str()
        } else {
            description
        };

        let summary = format!(
            "{} is a {} project by {} with {} stars and {} forks.",
            subject, info.language, info.owner, info.stars, info.forks
        );

        let purpose = if description.is_empty() {
            format!("Purpose of the {} repository", name)
        } else {
            description.to_string()
        };

        // languages, else the primary language, else the repository topics
        let mut technologies = languages.to_vec();
        if technologies.is_empty() && !info.language.is_empty() && info.language != "Not specified"
        {
            technologies.push(info.language.clone());
        }
        if technologies.is_empty() {
            technologies = info
                .topics
                .iter()
                .map(|topic| topic.trim())
                .filter(|topic| !topic.is_empty())
                .map(str::to_string)
                .collect();
        }

        let structure = if structure.trim().is_empty() {
            "Repository structure is unavailable.".to_string()
        } else {
            structure.to_string()
        };

        let mut facts = vec![format!(
            "The repository has {} stars and {} forks.",
            info.stars, info.forks
        )];
        if !languages.is_empty() {
            let top: Vec<&str> = languages.iter().take(3).map(String::as_str).collect();
            facts.push(format!("The main languages are {}.", top.join(", ")));
        }
        facts.push(format!(
            "There were {} commits in the last {} days.",
            activity.last_month_commits,
            ActivityData::WINDOW_DAYS
        ));
        facts.push(format!(
            "There are currently {} open issues and {} open pull requests.",
            activity.open_issues, activity.open_pull_requests
        ));

        Self {
            summary,
            purpose,
            technologies,
            structure,
            facts,
            contributors,
            activity,
        }
    }
}

fn non_empty_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn non_empty_list(values: &[String]) -> Option<Vec<String>> {
    let cleaned: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Append `extra` to `base`, skipping blanks and values already present.
fn merge_unique(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
    for value in extra {
        let value = value.trim();
        if !value.is_empty() && !base.iter().any(|existing| existing == value) {
            base.push(value.to_string());
        }
    }
    base
}

impl AnalysisResult {
    /// Combine baseline facts with whatever the summarization stages produced.
    pub fn merge(baseline: Baseline, enrichment: &Enrichment) -> Self {
        let readme = enrichment.readme.as_ref();
        let structure = enrichment.structure.as_ref();
        let synthesis = enrichment.synthesis.as_ref();

        let summary = synthesis
            .and_then(|s| non_empty_text(&s.overall_summary))
            .or_else(|| readme.and_then(|r| non_empty_text(&r.summary)))
            .unwrap_or(baseline.summary);
        let purpose = readme
            .and_then(|r| non_empty_text(&r.purpose))
            .unwrap_or(baseline.purpose);
        let technologies = readme
            .and_then(|r| non_empty_list(&r.technologies))
            .unwrap_or(baseline.technologies);
        let cool_facts = readme.and_then(|r| non_empty_list(&r.interesting_facts));
        let facts = match &cool_facts {
            Some(extra) => merge_unique(baseline.facts, extra),
            None => baseline.facts,
        };

        Self {
            summary,
            purpose,
            technologies,
            structure: baseline.structure,
            facts,
            features: readme.and_then(|r| non_empty_list(&r.features)),
            cool_facts,
            development_status: readme.map(|r| r.development_status),
            setup_complexity: readme.map(|r| r.setup_complexity),
            architecture: structure.and_then(|s| non_empty_text(&s.architecture)),
            code_organization: structure.and_then(|s| non_empty_text(&s.code_organization)),
            best_practices: structure.and_then(|s| non_empty_list(&s.best_practices)),
            improvement_suggestions: structure
                .and_then(|s| non_empty_list(&s.improvement_suggestions)),
            complexity_assessment: structure.map(|s| s.complexity),
            main_components: structure.and_then(|s| non_empty_list(&s.main_components)),
            strengths: synthesis.and_then(|s| non_empty_list(&s.strengths)),
            weaknesses: synthesis.and_then(|s| non_empty_list(&s.weaknesses)),
            use_cases: synthesis.and_then(|s| non_empty_list(&s.use_cases)),
            community_assessment: synthesis.and_then(|s| non_empty_text(&s.community_activity)),
            maintenance_quality: synthesis.and_then(|s| non_empty_text(&s.maintenance_quality)),
            learning_value: synthesis.and_then(|s| non_empty_text(&s.learning_value)),
            recommendation_score: synthesis.map(|s| s.recommendation_score),
            conclusion: synthesis.and_then(|s| non_empty_text(&s.conclusion)),
            contributors: Some(baseline.contributors),
            activity_data: Some(baseline.activity),
        }
    }

    /// Reshape a stored record into the public result (core fields only).
    pub fn from_stored(repository: &Repository, facts: Vec<String>) -> Self {
        Self {
            summary: repository.summary.clone(),
            purpose: repository.purpose.clone(),
            technologies: repository.technologies.clone(),
            structure: repository.structure.clone(),
            facts,
            ..Self::default()
        }
    }
}

/// Request body for the analyze endpoint.
///
/// ```json
/// { "url": "https://github.com/octocat/Hello-World", "apiKey": "ghi_..." }
/// ```
///
/// The key may instead be sent in the `X-API-Key` header.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRepositoryRequest {
    pub url: String,
    #[serde(default, alias = "api_key")]
    pub api_key: Option<String>,
}

/// Stored analysis as served by the results lookup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysisResponse {
    pub name: String,
    pub repo_url: String,
    pub avatar_url: String,
    pub stars: i64,
    pub analyzed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
}

impl StoredAnalysisResponse {
    pub fn new(repository: &Repository, facts: Vec<String>) -> Self {
        Self {
            name: format!("{}/{}", repository.owner, repository.repo_name),
            repo_url: repository.github_url.clone(),
            avatar_url: format!("https://github.com/{}.png", repository.owner),
            stars: repository.stars,
            analyzed_at: repository.analyzed_at,
            analysis: AnalysisResult::from_stored(repository, facts),
        }
    }
}
