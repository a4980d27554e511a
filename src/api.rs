use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::AppError;
use crate::fetch::FileFetcher;
use crate::ingest::{self, CsvUploadRequest, UploadSummary};
use crate::insights::{self, AnalysisRequest, AnalysisResult, TextGenerator};
use crate::performance::{self, PerformanceReport, PerformanceRequest};
use crate::store::SharedStore;

pub const PERFORMANCE_FAILED: &str = "PERFORMANCE_CALCULATION_FAILED";
pub const CSV_FAILED: &str = "CSV_PROCESSING_FAILED";
pub const ANALYSIS_FAILED: &str = "AI_ANALYSIS_FAILED";

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub fetcher: Arc<dyn FileFetcher>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub today: fn() -> NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Every handler failure is a 500 with the handler's fixed code.
#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    source: AppError,
}

impl ApiError {
    fn with_code(code: &'static str) -> impl Fn(AppError) -> Self {
        move |source| Self { code, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(code = self.code, error = %self.source, "request failed");
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.source.to_string(),
            }
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

// Parsed whatever the Content-Type header says.
fn body<T: DeserializeOwned>(payload: Bytes) -> Result<T, AppError> {
    serde_json::from_slice(&payload)
        .map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
}

pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

type ApiResult<T> = Result<Json<DataEnvelope<T>>, ApiError>;

async fn calculate_performance(
    State(state): State<AppState>,
    payload: Bytes,
) -> ApiResult<PerformanceReport> {
    let fail = ApiError::with_code(PERFORMANCE_FAILED);
    let client_id = body(payload).and_then(PerformanceRequest::validate).map_err(&fail)?;

    let today = (state.today)();
    let report = performance::evaluate_client(state.store.as_ref(), client_id, today)
        .await
        .map_err(&fail)?;

    Ok(Json(DataEnvelope { data: report }))
}

async fn process_csv(
    State(state): State<AppState>,
    payload: Bytes,
) -> ApiResult<UploadSummary> {
    let fail = ApiError::with_code(CSV_FAILED);
    let job = body(payload).and_then(CsvUploadRequest::validate).map_err(&fail)?;

    let summary = ingest::process_upload(
        state.store.as_ref(),
        state.fetcher.as_ref(),
        &job,
        (state.today)(),
    )
    .await
    .map_err(&fail)?;

    Ok(Json(DataEnvelope { data: summary }))
}

async fn ai_analysis(
    State(state): State<AppState>,
    payload: Bytes,
) -> ApiResult<AnalysisResult> {
    let fail = ApiError::with_code(ANALYSIS_FAILED);
    let job = body(payload).and_then(AnalysisRequest::validate).map_err(&fail)?;

    let result = insights::analyze(state.store.as_ref(), state.generator.as_deref(), job)
        .await
        .map_err(&fail)?;

    Ok(Json(DataEnvelope { data: result }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Answers every OPTIONS request itself with an empty 200.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
        .max_age(Duration::from_secs(86400))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/functions/v1/calculate-performance", post(calculate_performance))
        .route("/functions/v1/process-csv", post(process_csv))
        .route("/functions/v1/ai-analysis", post(ai_analysis))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
