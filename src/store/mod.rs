use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::StoreBackend;
use crate::error::StoreError;
use crate::models::{
    AiResponseRecord, Client, FileOutcome, NormalizedBatch, PerformanceStatus,
    SeoPerformanceRecord,
};

pub mod postgres;
pub mod rest;

pub use postgres::PgStore;
pub use rest::RestStore;

#[async_trait]
pub trait Store: Send + Sync {
    // Half-open: start <= date < end.
    async fn performance_between(
        &self,
        client_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SeoPerformanceRecord>, StoreError>;

    async fn set_performance_status(
        &self,
        client_id: Uuid,
        status: PerformanceStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn insert_batch(&self, batch: &NormalizedBatch) -> Result<usize, StoreError>;

    async fn mark_file(&self, file_url: &str, outcome: &FileOutcome) -> Result<(), StoreError>;

    async fn insert_ai_response(&self, record: &AiResponseRecord) -> Result<(), StoreError>;

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

pub async fn connect(backend: &StoreBackend) -> anyhow::Result<SharedStore> {
    let store: SharedStore = match backend {
        StoreBackend::Postgres { database_url } => Arc::new(PgStore::connect(database_url).await?),
        StoreBackend::Rest {
            base_url,
            service_key,
        } => Arc::new(RestStore::new(base_url, service_key)?),
    };
    Ok(store)
}
