//! Per-key analysis log.
//!
//! Every successful keyed analysis is recorded with the key that paid for it
//! and the result that was served, so the key owner can see which key ran
//! what. Unlike the dashboard history, an entry is written per request, not
//! per repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::analysis::AnalysisResult;
use crate::models::repository::Pagination;

/// A row of `analysis_history` joined with the name of its key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisLogRecord {
    pub id: Uuid,
    pub user_id: Uuid,

    /// `None` once the key has been deleted
    pub api_key_id: Option<Uuid>,
    pub api_key_name: Option<String>,

    pub repo_owner: String,
    pub repo_name: String,
    pub analysis_result: Json<AnalysisResult>,
    pub created_at: DateTime<Utc>,
}

/// Entry to be recorded after a keyed analysis was charged.
#[derive(Debug, Clone)]
pub struct NewAnalysisLogEntry {
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub repo_owner: String,
    pub repo_name: String,
    pub analysis_result: AnalysisResult,
}

/// Log entry as listed, without the stored result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisLogSummary {
    pub id: Uuid,
    pub repo_owner: String,
    pub repo_name: String,
    pub api_key_id: Option<Uuid>,
    pub api_key_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AnalysisLogRecord> for AnalysisLogSummary {
    fn from(record: AnalysisLogRecord) -> Self {
        Self {
            id: record.id,
            repo_owner: record.repo_owner,
            repo_name: record.repo_name,
            api_key_id: record.api_key_id,
            api_key_name: record.api_key_name,
            created_at: record.created_at,
        }
    }
}

/// One log entry with the result that was served.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisLogDetail {
    #[serde(flatten)]
    pub entry: AnalysisLogSummary,
    pub analysis: AnalysisResult,
}

impl From<AnalysisLogRecord> for AnalysisLogDetail {
    fn from(mut record: AnalysisLogRecord) -> Self {
        let analysis = std::mem::take(&mut record.analysis_result.0);
        Self {
            entry: record.into(),
            analysis,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisLogResponse {
    pub history: Vec<AnalysisLogSummary>,
    pub pagination: Pagination,
}
