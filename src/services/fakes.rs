//! Scripted collaborators for service and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::models::github::{ActivityData, Contributor, RepoInfo};
use crate::models::repository::RepositoryIdentity;
use crate::services::github::{GithubError, GithubSource};
use crate::services::openai::{CompletionError, CompletionModel};
use crate::services::summarizer::{README_SYSTEM, STRUCTURE_SYSTEM, SYNTHESIS_SYSTEM};

/// How a scripted stage answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Text(String),
    Timeout,
    Fail,
}

pub fn readme_reply() -> Reply {
    Reply::Json(json!({
        "summary": "A friendly greeting library.",
        "purpose": "Print greetings",
        "features": ["Greets people"],
        "technologies": ["Rust", "Tokio"],
        "interestingFacts": ["First fact", "Second fact", "Third fact", "Fourth fact"],
        "developmentStatus": "active",
        "setupComplexity": "low"
    }))
}

pub fn structure_reply() -> Reply {
    Reply::Json(json!({
        "architecture": "Single binary with a library core.",
        "codeOrganization": "Organized by feature.",
        "bestPractices": ["Small modules"],
        "improvementSuggestions": ["Add integration tests"],
        "complexity": "medium",
        "mainComponents": ["cli", "core"]
    }))
}

pub fn synthesis_reply() -> Reply {
    Reply::Json(json!({
        "overallSummary": "A small, well-kept greeting library.",
        "strengths": ["Simple API"],
        "weaknesses": ["Few features"],
        "useCases": ["Learning Rust"],
        "communityActivity": "Moderate",
        "maintenanceQuality": "Good",
        "learningValue": "High for beginners",
        "recommendationScore": 8,
        "conclusion": "Worth a look."
    }))
}

/// Completion model answering each stage from a script.
pub struct ScriptedModel {
    readme: Reply,
    structure: Reply,
    synthesis: Reply,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(readme: Reply, structure: Reply, synthesis: Reply) -> Self {
        Self {
            readme,
            structure,
            synthesis,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(readme_reply(), structure_reply(), synthesis_reply())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, system: &str, _prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let reply = match system {
            README_SYSTEM => &self.readme,
            STRUCTURE_SYSTEM => &self.structure,
            SYNTHESIS_SYSTEM => &self.synthesis,
            other => panic!("unexpected system prompt: {other}"),
        };

        match reply {
            Reply::Json(value) => Ok(value.to_string()),
            Reply::Text(text) => Ok(text.clone()),
            Reply::Timeout => Err(CompletionError::Timeout),
            Reply::Fail => Err(CompletionError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
        }
    }
}

/// GitHub source serving one fixed repository.
pub struct FakeGithub {
    missing: bool,
    delay: Duration,
    repo_calls: AtomicUsize,
}

impl FakeGithub {
    pub fn new() -> Self {
        Self {
            missing: false,
            delay: Duration::ZERO,
            repo_calls: AtomicUsize::new(0),
        }
    }

    /// Every repository lookup answers 404.
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::new()
        }
    }

    /// Slow down the repository lookup so concurrent requests overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn repo_calls(&self) -> usize {
        self.repo_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GithubSource for FakeGithub {
    async fn fetch_repo_info(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<RepoInfo, GithubError> {
        self.repo_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.missing {
            return Err(GithubError::NotFound);
        }

        // GitHub answers with its own spelling of known names
        let canonical = if identity.cache_key() == ("octocat".to_string(), "hello-world".to_string())
        {
            RepositoryIdentity::new("octocat", "Hello-World")
        } else {
            identity.clone()
        };

        Ok(RepoInfo {
            html_url: canonical.canonical_url(),
            owner: canonical.owner,
            repo: canonical.repo,
            stars: 1200,
            forks: 300,
            description: "My first repository on GitHub!".to_string(),
            language: "Rust".to_string(),
            readme: "# Hello World".to_string(),
            ..RepoInfo::default()
        })
    }

    async fn fetch_languages(&self, _identity: &RepositoryIdentity) -> Vec<String> {
        vec!["Rust".to_string(), "Shell".to_string()]
    }

    async fn fetch_structure(&self, _identity: &RepositoryIdentity) -> String {
        "Project root:\n- Directories: src\n- Files: Cargo.toml, README.md\n".to_string()
    }

    async fn fetch_contributors(
        &self,
        _identity: &RepositoryIdentity,
        limit: u32,
    ) -> Vec<Contributor> {
        vec![Contributor {
            username: "octocat".to_string(),
            contributions: 42,
            avatar_url: "https://avatars.githubusercontent.com/u/583231".to_string(),
            profile_url: "https://github.com/octocat".to_string(),
        }]
        .into_iter()
        .take(limit as usize)
        .collect()
    }

    async fn fetch_activity(&self, _identity: &RepositoryIdentity) -> ActivityData {
        ActivityData::default()
    }
}
