use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::Store;
use crate::error::StoreError;
use crate::models::{
    AiResponseRecord, Client, FileOutcome, NormalizedBatch, PerformanceStatus,
    ProcessingStatus, SeoPerformanceRecord,
};

// Keeps every statement well under the 65535 bind parameter ceiling.
const INSERT_CHUNK: usize = 1000;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads three demo clients with two weeks of daily performance rows
    /// ending at `today`: one improving, one flat, one falling off.
    pub async fn seed(&self, today: NaiveDate) -> anyhow::Result<()> {
        let clients = vec![
            (
                Uuid::parse_str("6f1c2a8e-3b4d-4e5f-9a7b-1c2d3e4f5a6b")?,
                "Harbor Dental",
                "harbordental.example",
                (180, 220),
                (4, 6),
            ),
            (
                Uuid::parse_str("2b7e9d14-8c3a-4f61-b2d5-7e8f9a0b1c2d")?,
                "Northside Plumbing",
                "northsideplumbing.example",
                (150, 148),
                (3, 3),
            ),
            (
                Uuid::parse_str("9d4e5f6a-7b8c-4d9e-8f0a-1b2c3d4e5f6a")?,
                "Copper Kettle Bakery",
                "copperkettle.example",
                (300, 240),
                (5, 2),
            ),
        ];

        for (id, name, domain, (previous_traffic, current_traffic), (previous_gain, current_gain)) in
            clients
        {
            sqlx::query(
                r#"
                INSERT INTO clients (id, name, domain)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, domain = EXCLUDED.domain
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(domain)
            .execute(&self.pool)
            .await?;

            let first_day = today - Duration::days(13);
            sqlx::query("DELETE FROM seo_performance_data WHERE client_id = $1 AND date >= $2")
                .bind(id)
                .bind(first_day)
                .execute(&self.pool)
                .await?;

            for offset in 0..14 {
                let date = first_day + Duration::days(offset);
                let (traffic, improved) = if date >= today - Duration::days(7) {
                    (current_traffic, current_gain)
                } else {
                    (previous_traffic, previous_gain)
                };

                sqlx::query(
                    r#"
                    INSERT INTO seo_performance_data
                    (id, client_id, date, organic_traffic, keyword_rankings_improved, keyword_rankings_declined)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(id)
                .bind(date)
                .bind(traffic)
                .bind(improved)
                .bind(1)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn performance_between(
        &self,
        client_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SeoPerformanceRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT date, organic_traffic, keyword_rankings_improved, keyword_rankings_declined
            FROM seo_performance_data
            WHERE client_id = $1 AND date >= $2 AND date < $3
            ORDER BY date
            "#,
        )
        .bind(client_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(SeoPerformanceRecord {
                date: row.try_get("date")?,
                organic_traffic: f64::from(row.try_get::<i32, _>("organic_traffic")?),
                keyword_rankings_improved: f64::from(
                    row.try_get::<i32, _>("keyword_rankings_improved")?,
                ),
                keyword_rankings_declined: f64::from(
                    row.try_get::<i32, _>("keyword_rankings_declined")?,
                ),
            });
        }

        Ok(records)
    }

    async fn set_performance_status(
        &self,
        client_id: Uuid,
        status: PerformanceStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE clients SET performance_status = $2, updated_at = $3 WHERE id = $1")
            .bind(client_id)
            .bind(status.as_str())
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_batch(&self, batch: &NormalizedBatch) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        match batch {
            NormalizedBatch::Keywords(rows) => {
                for chunk in rows.chunks(INSERT_CHUNK) {
                    let mut builder = QueryBuilder::<Postgres>::new(
                        "INSERT INTO keyword_data \
                         (id, client_id, keyword, search_volume, current_position, difficulty, cpc, url) ",
                    );
                    builder.push_values(chunk, |mut values, row| {
                        values
                            .push_bind(Uuid::new_v4())
                            .push_bind(row.client_id)
                            .push_bind(row.keyword.clone())
                            .push_bind(row.search_volume)
                            .push_bind(row.current_position)
                            .push_bind(row.difficulty)
                            .push_bind(row.cpc)
                            .push_bind(row.url.clone());
                    });
                    inserted += builder.build().execute(&mut *tx).await?.rows_affected();
                }
            }
            NormalizedBatch::Backlinks(rows) => {
                for chunk in rows.chunks(INSERT_CHUNK) {
                    let mut builder = QueryBuilder::<Postgres>::new(
                        "INSERT INTO backlink_data \
                         (id, client_id, source_url, target_url, anchor_text, domain_authority, link_type, status) ",
                    );
                    builder.push_values(chunk, |mut values, row| {
                        values
                            .push_bind(Uuid::new_v4())
                            .push_bind(row.client_id)
                            .push_bind(row.source_url.clone())
                            .push_bind(row.target_url.clone())
                            .push_bind(row.anchor_text.clone())
                            .push_bind(row.domain_authority)
                            .push_bind(row.link_type.clone())
                            .push_bind(row.status.clone());
                    });
                    inserted += builder.build().execute(&mut *tx).await?.rows_affected();
                }
            }
            NormalizedBatch::Competitors(rows) => {
                for chunk in rows.chunks(INSERT_CHUNK) {
                    let mut builder = QueryBuilder::<Postgres>::new(
                        "INSERT INTO competitor_data \
                         (id, client_id, competitor_name, competitor_url, domain_authority, organic_traffic, total_keywords, analysis_date) ",
                    );
                    builder.push_values(chunk, |mut values, row| {
                        values
                            .push_bind(Uuid::new_v4())
                            .push_bind(row.client_id)
                            .push_bind(row.competitor_name.clone())
                            .push_bind(row.competitor_url.clone())
                            .push_bind(row.domain_authority)
                            .push_bind(row.organic_traffic)
                            .push_bind(row.total_keywords)
                            .push_bind(row.analysis_date);
                    });
                    inserted += builder.build().execute(&mut *tx).await?.rows_affected();
                }
            }
        }

        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn mark_file(&self, file_url: &str, outcome: &FileOutcome) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE uploaded_files
            SET is_processed = $2, processing_status = $3, processing_results = $4
            WHERE file_url = $1
            "#,
        )
        .bind(file_url)
        .bind(outcome.status != ProcessingStatus::Failed)
        .bind(outcome.status.as_str())
        .bind(Json(&outcome.results))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_ai_response(&self, record: &AiResponseRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ai_responses
            (id, client_id, input_data, ai_response, response_type, tokens_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.client_id)
        .bind(&record.input_data)
        .bind(&record.ai_response)
        .bind(&record.response_type)
        .bind(record.tokens_used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, domain, performance_status, updated_at FROM clients ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut clients = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("performance_status")?;
            clients.push(Client {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                domain: row.try_get("domain")?,
                performance_status: status
                    .parse()
                    .map_err(|_| StoreError::Decode(format!("performance_status {status}")))?,
                updated_at: row.try_get("updated_at")?,
            });
        }

        Ok(clients)
    }
}
