#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use agency_insights::api::{self, AppState};
use agency_insights::error::{AppError, StoreError};
use agency_insights::fetch::FileFetcher;
use agency_insights::insights::{Generation, TextGenerator};
use agency_insights::models::{
    AiResponseRecord, Client, FileOutcome, NormalizedBatch, PerformanceStatus,
    SeoPerformanceRecord,
};
use agency_insights::store::Store;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
}

#[derive(Default)]
pub struct MemoryStore {
    pub performance: Mutex<Vec<(Uuid, SeoPerformanceRecord)>>,
    pub statuses: Mutex<HashMap<Uuid, PerformanceStatus>>,
    pub batches: Mutex<Vec<NormalizedBatch>>,
    pub files: Mutex<Vec<(String, FileOutcome)>>,
    pub ai_responses: Mutex<Vec<AiResponseRecord>>,
    pub fail_reads: AtomicBool,
    pub fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn add_day(&self, client_id: Uuid, days_ago: i64, traffic: f64, improved: f64, declined: f64) {
        let record = SeoPerformanceRecord {
            date: today() - Duration::days(days_ago),
            organic_traffic: traffic,
            keyword_rankings_improved: improved,
            keyword_rankings_declined: declined,
        };
        self.performance.lock().unwrap().push((client_id, record));
    }

    pub fn status_of(&self, client_id: Uuid) -> Option<PerformanceStatus> {
        self.statuses.lock().unwrap().get(&client_id).copied()
    }

    pub fn file_outcome(&self, file_url: &str) -> Option<FileOutcome> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(url, _)| url == file_url)
            .map(|(_, outcome)| outcome.clone())
    }
}

fn unavailable() -> StoreError {
    StoreError::Status {
        status: 503,
        body: "store unavailable".to_string(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn performance_between(
        &self,
        client_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SeoPerformanceRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .performance
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, r)| *id == client_id && r.date >= start && r.date < end)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn set_performance_status(
        &self,
        client_id: Uuid,
        status: PerformanceStatus,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.statuses.lock().unwrap().insert(client_id, status);
        Ok(())
    }

    async fn insert_batch(&self, batch: &NormalizedBatch) -> Result<usize, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(batch.len())
    }

    async fn mark_file(&self, file_url: &str, outcome: &FileOutcome) -> Result<(), StoreError> {
        self.files
            .lock()
            .unwrap()
            .push((file_url.to_string(), outcome.clone()));
        Ok(())
    }

    async fn insert_ai_response(&self, record: &AiResponseRecord) -> Result<(), StoreError> {
        self.ai_responses.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(Vec::new())
    }
}

/// Serves canned file bodies by URL; unknown URLs fail like a 404.
#[derive(Default)]
pub struct StaticFetcher {
    pub files: HashMap<String, String>,
}

#[async_trait]
impl FileFetcher for StaticFetcher {
    async fn fetch_text(&self, location: &str) -> Result<String, AppError> {
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| AppError::Fetch(format!("{location} responded with 404 Not Found")))
    }
}

pub struct CannedGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(Generation {
            text: self.reply.clone(),
            tokens_used: 42,
        })
    }
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub generator: Option<Arc<CannedGenerator>>,
    pub app: axum::Router,
}

pub fn build_test_context(files: &[(&str, &str)], reply: Option<&str>) -> TestContext {
    let store = Arc::new(MemoryStore::default());
    let fetcher = StaticFetcher {
        files: files
            .iter()
            .map(|(url, body)| (url.to_string(), body.to_string()))
            .collect(),
    };
    let generator = reply.map(|reply| {
        Arc::new(CannedGenerator {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    });

    let state = AppState {
        store: store.clone(),
        fetcher: Arc::new(fetcher),
        generator: generator
            .clone()
            .map(|g| g as Arc<dyn TextGenerator>),
        today,
    };

    TestContext {
        store,
        generator,
        app: api::router(state),
    }
}

pub async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, json)
}
