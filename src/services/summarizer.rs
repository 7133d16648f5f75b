//! Multi-stage repository summarization.
//!
//! # Stages
//!
//! 1. README analysis (README text, truncated)
//! 2. Structure analysis (directory listing + languages)
//! 3. Comprehensive synthesis (outputs of 1 and 2 + repository vitals)
//!
//! Stages 1 and 2 are independent and run concurrently. Stage 3 runs only when
//! both succeed. Each response must parse into its stage schema and pass
//! validation, otherwise the stage counts as failed and its fields are left
//! out of the [`Enrichment`].

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::models::analysis::{Enrichment, ReadmeAnalysis, StructureAnalysis, Synthesis};
use crate::models::github::RepoInfo;
use crate::services::openai::{CompletionError, CompletionModel, truncate_chars};

/// Interesting facts kept from the README stage.
const MAX_INTERESTING_FACTS: usize = 3;

pub(crate) const README_SYSTEM: &str = "You are an expert software analyst who reads \
GitHub README files. Respond with a single JSON object and nothing else.";

pub(crate) const STRUCTURE_SYSTEM: &str = "You are an expert software architect who \
reviews repository layouts. Respond with a single JSON object and nothing else.";

pub(crate) const SYNTHESIS_SYSTEM: &str = "You are a senior engineer writing an overall \
assessment of an open-source repository. Respond with a single JSON object and nothing else.";

#[derive(Debug, thiserror::Error)]
pub enum SummarizationError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("response did not match the stage schema: {0}")]
    Schema(String),

    #[error("response failed validation: {0}")]
    Invalid(String),
}

impl SummarizationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SummarizationError::Completion(e) if e.is_timeout())
    }
}

/// Facts the stages are computed from.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub info: &'a RepoInfo,
    pub languages: &'a [String],
    pub structure: &'a str,
}

/// Result of running the stages for one repository.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub enrichment: Enrichment,
    /// Every stage that was attempted failed by timing out.
    pub timed_out: bool,
}

pub struct Summarizer {
    model: Arc<dyn CompletionModel>,
    readme_max_chars: usize,
}

impl Summarizer {
    pub fn new(model: Arc<dyn CompletionModel>, readme_max_chars: usize) -> Self {
        Self {
            model,
            readme_max_chars,
        }
    }

    /// Run all stages. Never fails; failed stages are logged and omitted.
    pub async fn summarize(&self, input: SummaryInput<'_>) -> Summary {
        let (readme, structure) = tokio::join!(
            self.analyze_readme(input.info),
            self.analyze_structure(input.structure, input.languages),
        );

        let timed_out = matches!(
            (&readme, &structure),
            (Err(a), Err(b)) if a.is_timeout() && b.is_timeout()
        );

        let mut enrichment = Enrichment::default();
        match (readme, structure) {
            (Ok(readme), Ok(structure)) => {
                match self
                    .synthesize(input.info, input.languages, &readme, &structure)
                    .await
                {
                    Ok(synthesis) => enrichment.synthesis = Some(synthesis),
                    Err(e) => log_stage_failure("synthesis", input.info, &e),
                }
                enrichment.readme = Some(readme);
                enrichment.structure = Some(structure);
            }
            (readme, structure) => {
                match readme {
                    Ok(readme) => enrichment.readme = Some(readme),
                    Err(e) => log_stage_failure("readme", input.info, &e),
                }
                match structure {
                    Ok(structure) => enrichment.structure = Some(structure),
                    Err(e) => log_stage_failure("structure", input.info, &e),
                }
            }
        }

        Summary {
            enrichment,
            timed_out,
        }
    }

    pub async fn analyze_readme(
        &self,
        info: &RepoInfo,
    ) -> Result<ReadmeAnalysis, SummarizationError> {
        let prompt = readme_prompt(info, self.readme_max_chars);
        let text = self.model.complete(README_SYSTEM, &prompt).await?;
        let mut analysis: ReadmeAnalysis = parse_json_response(&text)?;

        if analysis.summary.trim().is_empty() {
            return Err(SummarizationError::Invalid("summary is empty".to_string()));
        }
        analysis.interesting_facts.truncate(MAX_INTERESTING_FACTS);

        Ok(analysis)
    }

    pub async fn analyze_structure(
        &self,
        structure: &str,
        languages: &[String],
    ) -> Result<StructureAnalysis, SummarizationError> {
        let prompt = structure_prompt(structure, languages);
        let text = self.model.complete(STRUCTURE_SYSTEM, &prompt).await?;
        let analysis: StructureAnalysis = parse_json_response(&text)?;

        if analysis.architecture.trim().is_empty() {
            return Err(SummarizationError::Invalid(
                "architecture is empty".to_string(),
            ));
        }

        Ok(analysis)
    }

    pub async fn synthesize(
        &self,
        info: &RepoInfo,
        languages: &[String],
        readme: &ReadmeAnalysis,
        structure: &StructureAnalysis,
    ) -> Result<Synthesis, SummarizationError> {
        let prompt = synthesis_prompt(info, languages, readme, structure)?;
        let text = self.model.complete(SYNTHESIS_SYSTEM, &prompt).await?;
        let synthesis: Synthesis = parse_json_response(&text)?;

        if synthesis.overall_summary.trim().is_empty() {
            return Err(SummarizationError::Invalid(
                "overallSummary is empty".to_string(),
            ));
        }
        if !(1..=10).contains(&synthesis.recommendation_score) {
            return Err(SummarizationError::Invalid(format!(
                "recommendationScore {} is outside 1..=10",
                synthesis.recommendation_score
            )));
        }

        Ok(synthesis)
    }
}

fn log_stage_failure(stage: &str, info: &RepoInfo, error: &SummarizationError) {
    tracing::warn!(
        stage,
        owner = %info.owner,
        repo = %info.repo,
        "Summarization stage failed: {}",
        error
    );
}

/// Parse the JSON object embedded in a model response.
///
/// Models sometimes wrap the object in a markdown fence or prose, so the
/// outermost `{ ... }` span is extracted first.
fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, SummarizationError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(SummarizationError::Schema(format!(
                "no JSON object in response: {}",
                truncate_chars(text, 80)
            )));
        }
    };

    serde_json::from_str(json).map_err(|e| SummarizationError::Schema(e.to_string()))
}

fn readme_prompt(info: &RepoInfo, max_chars: usize) -> String {
    let readme = if info.readme.trim().is_empty() {
        "(this repository has no README)".to_string()
    } else {
        truncate_chars(&info.readme, max_chars)
    };

    format!(
        r#"Analyze the README of the GitHub repository {owner}/{repo}.

README:
{readme}

Return a JSON object with exactly these fields:
- "summary": what the project is and does, in 2-3 sentences
- "purpose": the problem it solves, in one sentence
- "features": list of main features
- "technologies": list of technologies, frameworks and languages used
- "interestingFacts": list of 3 notable or surprising facts about the project
- "developmentStatus": one of "active", "maintained", "experimental", "deprecated", "unknown"
- "setupComplexity": one of "low", "medium", "high""#,
        owner = info.owner,
        repo = info.repo,
        readme = readme,
    )
}

fn structure_prompt(structure: &str, languages: &[String]) -> String {
    let languages = if languages.is_empty() {
        "unknown".to_string()
    } else {
        languages.join(", ")
    };

    format!(
        r#"Analyze the layout of a GitHub repository.

Languages (most used first): {languages}

Structure:
{structure}

Return a JSON object with exactly these fields:
- "architecture": the overall architecture, in 2-3 sentences
- "codeOrganization": how the code is organized
- "bestPractices": list of good practices visible in the layout
- "improvementSuggestions": list of concrete suggestions
- "complexity": one of "low", "medium", "high"
- "mainComponents": list of the main components or modules"#,
    )
}

fn synthesis_prompt(
    info: &RepoInfo,
    languages: &[String],
    readme: &ReadmeAnalysis,
    structure: &StructureAnalysis,
) -> Result<String, SummarizationError> {
    let readme_json =
        serde_json::to_string(readme).map_err(|e| SummarizationError::Schema(e.to_string()))?;
    let structure_json =
        serde_json::to_string(structure).map_err(|e| SummarizationError::Schema(e.to_string()))?;

    Ok(format!(
        r#"Write an overall assessment of the GitHub repository {owner}/{repo}.

Vitals:
- Description: {description}
- Stars: {stars}
- Forks: {forks}
- Primary language: {language}
- Languages: {languages}

README analysis:
{readme_json}

Structure analysis:
{structure_json}

Return a JSON object with exactly these fields:
- "overallSummary": a comprehensive summary in 3-4 sentences
- "strengths": list of strengths
- "weaknesses": list of weaknesses
- "useCases": list of situations where the project is a good fit
- "communityActivity": assessment of community activity
- "maintenanceQuality": assessment of maintenance quality
- "learningValue": what a developer can learn from it
- "recommendationScore": integer from 1 to 10
- "conclusion": one closing sentence"#,
        owner = info.owner,
        repo = info.repo,
        description = info.description,
        stars = info.stars,
        forks = info.forks,
        language = info.language,
        languages = languages.join(", "),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::{DevelopmentStatus, Level};
    use crate::services::fakes::{Reply, ScriptedModel, readme_reply, structure_reply, synthesis_reply};

    fn info() -> RepoInfo {
        RepoInfo {
            owner: "octocat".to_string(),
            repo: "hello".to_string(),
            readme: "é".repeat(20),
            ..RepoInfo::default()
        }
    }

    fn summarizer(model: ScriptedModel) -> (Arc<ScriptedModel>, Summarizer) {
        let model = Arc::new(model);
        (model.clone(), Summarizer::new(model, 10))
    }

    async fn run(summarizer: &Summarizer) -> Summary {
        let info = info();
        let languages = vec!["Rust".to_string()];
        summarizer
            .summarize(SummaryInput {
                info: &info,
                languages: &languages,
                structure: "Project root:\n",
            })
            .await
    }

    #[test]
    fn json_is_extracted_from_fenced_response() {
        let text = "Here you go:\n```json\n{\"architecture\": \"layered\", \"codeOrganization\": \"by feature\", \"bestPractices\": [], \"improvementSuggestions\": [], \"complexity\": \"low\", \"mainComponents\": []}\n```";
        let parsed: StructureAnalysis = parse_json_response(text).unwrap();
        assert_eq!(parsed.architecture, "layered");
        assert_eq!(parsed.complexity, Level::Low);

        let err = parse_json_response::<StructureAnalysis>("no json here").unwrap_err();
        assert!(matches!(err, SummarizationError::Schema(_)));
    }

    #[test]
    fn readme_is_truncated_by_characters() {
        let prompt = readme_prompt(&info(), 10);
        assert!(prompt.contains(&"é".repeat(10)));
        assert!(!prompt.contains(&"é".repeat(11)));
    }

    #[tokio::test]
    async fn all_stages_succeed() {
        let (model, summarizer) = summarizer(ScriptedModel::healthy());
        let summary = run(&summarizer).await;

        let readme = summary.enrichment.readme.unwrap();
        assert_eq!(readme.interesting_facts.len(), 3);
        assert_eq!(readme.development_status, DevelopmentStatus::Active);
        assert!(summary.enrichment.structure.is_some());
        assert_eq!(
            summary.enrichment.synthesis.unwrap().recommendation_score,
            8
        );
        assert!(!summary.timed_out);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn synthesis_is_skipped_when_an_earlier_stage_fails() {
        let model = ScriptedModel::new(
            readme_reply(),
            Reply::Text("I cannot help with that.".to_string()),
            synthesis_reply(),
        );
        let (model, summarizer) = summarizer(model);
        let summary = run(&summarizer).await;

        assert!(summary.enrichment.readme.is_some());
        assert!(summary.enrichment.structure.is_none());
        assert!(summary.enrichment.synthesis.is_none());
        assert!(!summary.timed_out);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn out_of_range_score_fails_synthesis_only() {
        let mut bad = synthesis_reply();
        if let Reply::Json(value) = &mut bad {
            value["recommendationScore"] = serde_json::json!(11);
        }
        let (_, summarizer) = summarizer(ScriptedModel::new(readme_reply(), structure_reply(), bad));
        let summary = run(&summarizer).await;

        assert!(summary.enrichment.readme.is_some());
        assert!(summary.enrichment.structure.is_some());
        assert!(summary.enrichment.synthesis.is_none());
    }

    #[tokio::test]
    async fn timeouts_on_every_attempted_stage_are_flagged() {
        let (_, summarizer) =
            summarizer(ScriptedModel::new(Reply::Timeout, Reply::Timeout, Reply::Timeout));
        let summary = run(&summarizer).await;

        assert!(summary.enrichment.is_empty());
        assert!(summary.timed_out);
    }

    #[tokio::test]
    async fn mixed_failures_are_not_a_timeout() {
        let (_, summarizer) =
            summarizer(ScriptedModel::new(Reply::Timeout, Reply::Fail, Reply::Timeout));
        let summary = run(&summarizer).await;

        assert!(summary.enrichment.is_empty());
        assert!(!summary.timed_out);
    }
}
