use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde_json::{json, Value};
use uuid::Uuid;

use super::Store;
use crate::error::StoreError;
use crate::models::{
    AiResponseRecord, Client, FileOutcome, NormalizedBatch, PerformanceStatus,
    ProcessingStatus, SeoPerformanceRecord,
};

/// Store backed by a PostgREST-style HTTP surface (`/rest/v1/<table>`).
#[derive(Debug, Clone)]
pub struct RestStore {
    http: HttpClient,
    base_url: String,
    service_key: String,
}

impl RestStore {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let http = HttpClient::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("agency-insights/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn patch(&self, table: &str, filter: &[(&str, String)], body: &Value) -> Result<(), StoreError> {
        let request = self.http.patch(self.table_url(table)).query(filter).json(body);
        ensure_success(self.authorized(request).send().await?).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Store for RestStore {
    async fn performance_between(
        &self,
        client_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SeoPerformanceRecord>, StoreError> {
        let request = self.http.get(self.table_url("seo_performance_data")).query(&[
            ("client_id", format!("eq.{client_id}")),
            ("date", format!("gte.{start}")),
            ("date", format!("lt.{end}")),
        ]);
        let response = ensure_success(self.authorized(request).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn set_performance_status(
        &self,
        client_id: Uuid,
        status: PerformanceStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.patch(
            "clients",
            &[("id", format!("eq.{client_id}"))],
            &json!({
                "performance_status": status,
                "updated_at": updated_at,
            }),
        )
        .await
    }

    async fn insert_batch(&self, batch: &NormalizedBatch) -> Result<usize, StoreError> {
        let rows = match batch {
            NormalizedBatch::Keywords(rows) => serde_json::to_value(rows),
            NormalizedBatch::Backlinks(rows) => serde_json::to_value(rows),
            NormalizedBatch::Competitors(rows) => serde_json::to_value(rows),
        }
        .map_err(|e| StoreError::Decode(e.to_string()))?;

        let request = self
            .http
            .post(self.table_url(batch.category().table()))
            .header("Prefer", "return=representation")
            .json(&rows);
        let response = ensure_success(self.authorized(request).send().await?).await?;
        let inserted: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(inserted.len())
    }

    async fn mark_file(&self, file_url: &str, outcome: &FileOutcome) -> Result<(), StoreError> {
        self.patch(
            "uploaded_files",
            &[("file_url", format!("eq.{file_url}"))],
            &json!({
                "is_processed": outcome.status != ProcessingStatus::Failed,
                "processing_status": outcome.status,
                "processing_results": outcome.results,
            }),
        )
        .await
    }

    async fn insert_ai_response(&self, record: &AiResponseRecord) -> Result<(), StoreError> {
        let request = self.http.post(self.table_url("ai_responses")).json(record);
        ensure_success(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let request = self.http.get(self.table_url("clients")).query(&[
            ("select", "id,name,domain,performance_status,updated_at"),
            ("order", "name.asc"),
        ]);
        let response = ensure_success(self.authorized(request).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}
