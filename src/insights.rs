use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GeminiConfig;
use crate::error::AppError;
use crate::models::{parse_client_id, AiResponseRecord};
use crate::store::Store;

const TEMPERATURE: f64 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    KeywordOpportunities,
    CompetitorAnalysis,
    PerformanceSummary,
    ContentStrategy,
    General,
}

impl AnalysisType {
    /// Unknown tags fall back to a general analysis.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "keyword_opportunities" => Self::KeywordOpportunities,
            "competitor_analysis" => Self::CompetitorAnalysis,
            "performance_summary" => Self::PerformanceSummary,
            "content_strategy" => Self::ContentStrategy,
            _ => Self::General,
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::KeywordOpportunities => {
                "Review this keyword data for an SEO client. List the three fastest ranking \
                 wins, a longer-term plan, and topics the site does not cover yet."
            }
            Self::CompetitorAnalysis => {
                "Compare the client against these competitors. Call out where competitors are \
                 weak, what they do well, and topics none of them cover."
            }
            Self::PerformanceSummary => {
                "Summarise this week's SEO performance. Note wins and concerns, explain the \
                 traffic trend, and list next week's actions."
            }
            Self::ContentStrategy => {
                "Propose a content plan from this keyword and traffic data: five priority \
                 topics, target keywords for each, and a rough timeline for results."
            }
            Self::General => "Review this SEO data and share the most useful insights.",
        }
    }
}

pub fn build_prompt(kind: AnalysisType, data: &Value) -> String {
    format!("{}\n\nData:\n{}", kind.instructions(), data)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_used: i64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, AppError>;
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: i64,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(config: GeminiConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("agency-insights/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::GenerationFailed(e.to_string()))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Generation, AppError> {
        let url = format!(
            "{}/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GenerationFailed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationFailed(format!(
                "Gemini API error ({status}): {text}"
            )));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AppError::GenerationFailed(format!("invalid response: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| AppError::GenerationFailed("response had no text".to_string()))?;

        Ok(Generation {
            text,
            tokens_used: parsed
                .usage_metadata
                .map(|usage| usage.total_token_count)
                .unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub client_id: Option<String>,
    pub analysis_type: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub client_id: Uuid,
    pub analysis_type: String,
    pub data: Value,
}

impl AnalysisRequest {
    pub fn validate(self) -> Result<AnalysisJob, AppError> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let (Some(client_id), Some(analysis_type)) =
            (present(self.client_id), present(self.analysis_type))
        else {
            return Err(AppError::missing("clientId, analysisType"));
        };

        Ok(AnalysisJob {
            client_id: parse_client_id(&client_id)?,
            analysis_type,
            data: self.data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis: String,
    #[serde(rename = "type")]
    pub analysis_type: String,
    pub client_id: Uuid,
}

/// Generates an insight and keeps a copy of it. A failed save is logged and
/// the insight is still returned.
pub async fn analyze(
    store: &dyn Store,
    generator: Option<&dyn TextGenerator>,
    job: AnalysisJob,
) -> Result<AnalysisResult, AppError> {
    let generator = generator
        .ok_or_else(|| AppError::GenerationFailed("Gemini API key not configured".to_string()))?;

    let prompt = build_prompt(AnalysisType::from_tag(&job.analysis_type), &job.data);
    let generation = generator.generate(&prompt).await?;

    let record = AiResponseRecord {
        client_id: job.client_id,
        input_data: job.data.to_string(),
        ai_response: generation.text.clone(),
        response_type: job.analysis_type.clone(),
        tokens_used: generation.tokens_used,
    };
    if let Err(err) = store.insert_ai_response(&record).await {
        warn!(client_id = %job.client_id, error = %err, "failed to save ai response");
    }

    info!(
        client_id = %job.client_id,
        analysis_type = %job.analysis_type,
        tokens = generation.tokens_used,
        "analysis generated"
    );

    Ok(AnalysisResult {
        analysis: generation.text,
        analysis_type: job.analysis_type,
        client_id: job.client_id,
    })
}
