use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceStatus {
    Green,
    Yellow,
    Red,
}

impl PerformanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerformanceStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "red" => Ok(Self::Red),
            other => Err(AppError::Validation(format!(
                "unknown performance status: {other}"
            ))),
        }
    }
}

/// Direction of a client's trend, with an explicit state for windows that
/// hold no records at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Insufficient,
    Declined,
    Stable,
    Improved,
}

pub fn parse_client_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("clientId must be a UUID, got {raw:?}")))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub domain: String,
    pub performance_status: PerformanceStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeoPerformanceRecord {
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_number")]
    pub organic_traffic: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub keyword_rankings_improved: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub keyword_rankings_declined: f64,
}

/// Accepts a JSON number, a numeric string or null; anything else is 0.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCategory {
    Keywords,
    Backlinks,
    Competitors,
}

impl DataCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keywords => "keywords",
            Self::Backlinks => "backlinks",
            Self::Competitors => "competitors",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Keywords => "keyword_data",
            Self::Backlinks => "backlink_data",
            Self::Competitors => "competitor_data",
        }
    }
}

impl FromStr for DataCategory {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "keywords" => Ok(Self::Keywords),
            "backlinks" => Ok(Self::Backlinks),
            "competitors" => Ok(Self::Competitors),
            other => Err(AppError::UnsupportedCategory(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordRecord {
    pub client_id: Uuid,
    pub keyword: String,
    pub search_volume: i64,
    pub current_position: i64,
    pub difficulty: i64,
    pub cpc: f64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacklinkRecord {
    pub client_id: Uuid,
    pub source_url: String,
    pub target_url: String,
    pub anchor_text: String,
    pub domain_authority: f64,
    pub link_type: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorRecord {
    pub client_id: Uuid,
    pub competitor_name: String,
    pub competitor_url: String,
    pub domain_authority: f64,
    pub organic_traffic: i64,
    pub total_keywords: i64,
    pub analysis_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedBatch {
    Keywords(Vec<KeywordRecord>),
    Backlinks(Vec<BacklinkRecord>),
    Competitors(Vec<CompetitorRecord>),
}

impl NormalizedBatch {
    pub fn category(&self) -> DataCategory {
        match self {
            Self::Keywords(_) => DataCategory::Keywords,
            Self::Backlinks(_) => DataCategory::Backlinks,
            Self::Competitors(_) => DataCategory::Competitors,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Keywords(rows) => rows.len(),
            Self::Backlinks(rows) => rows.len(),
            Self::Competitors(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    PartiallyFailed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResults {
    pub total_records: usize,
    pub inserted_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub status: ProcessingStatus,
    pub results: ProcessingResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiResponseRecord {
    pub client_id: Uuid,
    pub input_data: String,
    pub ai_response: String,
    pub response_type: String,
    pub tokens_used: i64,
}
