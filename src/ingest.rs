use std::collections::HashMap;

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::fetch::FileFetcher;
use crate::models::{
    parse_client_id, BacklinkRecord, CompetitorRecord, DataCategory, FileOutcome, KeywordRecord,
    NormalizedBatch, ProcessingResults, ProcessingStatus,
};
use crate::store::Store;

pub type RawRow = HashMap<String, String>;

/// A target field and the header spellings accepted for it, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
}

const fn field(field: &'static str, aliases: &'static [&'static str]) -> FieldAliases {
    FieldAliases { field, aliases }
}

pub const KEYWORD_ALIASES: &[FieldAliases] = &[
    field("keyword", &["keyword", "query", "term"]),
    field("search_volume", &["volume", "search volume", "searches"]),
    field("current_position", &["position", "rank", "ranking"]),
    field("difficulty", &["difficulty", "kd", "competition"]),
    field("cpc", &["cpc", "cost per click"]),
    field("url", &["url", "page"]),
];

pub const BACKLINK_ALIASES: &[FieldAliases] = &[
    field("source_url", &["source url", "source", "from"]),
    field("target_url", &["target url", "target", "to"]),
    field("anchor_text", &["anchor", "anchor text", "text"]),
    field("domain_authority", &["da", "domain authority", "dr"]),
    field("link_type", &["type", "link type"]),
];

pub const COMPETITOR_ALIASES: &[FieldAliases] = &[
    field("competitor_name", &["competitor", "name", "domain"]),
    field("competitor_url", &["url", "website", "domain"]),
    field("domain_authority", &["da", "domain authority", "dr"]),
    field("organic_traffic", &["traffic", "organic traffic", "visits"]),
    field("total_keywords", &["keywords", "total keywords"]),
];

pub fn alias_table(category: DataCategory) -> &'static [FieldAliases] {
    match category {
        DataCategory::Keywords => KEYWORD_ALIASES,
        DataCategory::Backlinks => BACKLINK_ALIASES,
        DataCategory::Competitors => COMPETITOR_ALIASES,
    }
}

pub fn identifying_field(category: DataCategory) -> &'static str {
    match category {
        DataCategory::Keywords => "keyword",
        DataCategory::Backlinks => "source_url",
        DataCategory::Competitors => "competitor_name",
    }
}

/// Parses delimited text into header-keyed rows.
///
/// Blank lines are skipped and the first remaining line is the header.
/// Short rows read their missing cells as empty strings.
pub fn parse_rows(text: &str) -> Result<Vec<RawRow>, AppError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut records = reader
        .records()
        .map(|result| result.map_err(|e| AppError::Validation(format!("malformed CSV: {e}"))))
        .filter(|result| match result {
            // A whitespace-only line trims to a single empty cell.
            Ok(record) => record.len() > 1 || record.iter().any(|cell| !cell.is_empty()),
            Err(_) => true,
        });

    let headers: Vec<String> = match records.next() {
        Some(header) => header?.iter().map(str::to_lowercase).collect(),
        None => return Ok(Vec::new()),
    };

    records
        .map(|result| {
            let record = result?;
            Ok(headers
                .iter()
                .enumerate()
                .map(|(index, key)| (key.clone(), record.get(index).unwrap_or("").to_string()))
                .collect())
        })
        .collect()
}

/// Reads the leading numeric part of a cell: `"1,900"` is 1900, `"3rd"` is
/// 3, `"$1.25"` is 1.25. Anything without a leading number is 0.
pub fn parse_number(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (index, c) in cleaned.char_indices() {
        match c {
            '+' | '-' if index == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = index + c.len_utf8();
    }

    if !seen_digit {
        return 0.0;
    }
    cleaned[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

pub fn parse_integer(raw: &str) -> i64 {
    parse_number(raw).trunc() as i64
}

struct Mapper<'a> {
    row: &'a RawRow,
    table: &'static [FieldAliases],
}

impl<'a> Mapper<'a> {
    fn lookup(&self, target: &str) -> Option<&'a str> {
        let aliases = self
            .table
            .iter()
            .find(|entry| entry.field == target)
            .map(|entry| entry.aliases)
            .unwrap_or_default();

        aliases
            .iter()
            .filter_map(|alias| self.row.get(*alias))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }

    fn text(&self, target: &str) -> String {
        self.lookup(target).unwrap_or_default().to_string()
    }

    fn text_or(&self, target: &str, default: &str) -> String {
        self.lookup(target).unwrap_or(default).to_string()
    }

    fn integer(&self, target: &str) -> i64 {
        self.lookup(target).map(parse_integer).unwrap_or(0)
    }

    fn float(&self, target: &str) -> f64 {
        self.lookup(target).map(parse_number).unwrap_or(0.0)
    }
}

pub fn normalize(
    category: DataCategory,
    client_id: Uuid,
    rows: &[RawRow],
    today: NaiveDate,
) -> NormalizedBatch {
    let table = alias_table(category);
    let mappers = rows.iter().map(|row| Mapper { row, table });

    match category {
        DataCategory::Keywords => NormalizedBatch::Keywords(
            mappers
                .map(|m| KeywordRecord {
                    client_id,
                    keyword: m.text("keyword"),
                    search_volume: m.integer("search_volume"),
                    current_position: m.integer("current_position"),
                    difficulty: m.integer("difficulty"),
                    cpc: m.float("cpc"),
                    url: m.text("url"),
                })
                .filter(|r| !r.keyword.is_empty())
                .collect(),
        ),
        DataCategory::Backlinks => NormalizedBatch::Backlinks(
            mappers
                .map(|m| BacklinkRecord {
                    client_id,
                    source_url: m.text("source_url"),
                    target_url: m.text("target_url"),
                    anchor_text: m.text("anchor_text"),
                    domain_authority: m.float("domain_authority"),
                    link_type: m.text_or("link_type", "follow"),
                    status: "active".to_string(),
                })
                .filter(|r| !r.source_url.is_empty())
                .collect(),
        ),
        DataCategory::Competitors => NormalizedBatch::Competitors(
            mappers
                .map(|m| CompetitorRecord {
                    client_id,
                    competitor_name: m.text("competitor_name"),
                    competitor_url: m.text("competitor_url"),
                    domain_authority: m.float("domain_authority"),
                    organic_traffic: m.integer("organic_traffic"),
                    total_keywords: m.integer("total_keywords"),
                    analysis_date: today,
                })
                .filter(|r| !r.competitor_name.is_empty())
                .collect(),
        ),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvUploadRequest {
    pub file_url: Option<String>,
    pub client_id: Option<String>,
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadJob {
    pub file_url: String,
    pub client_id: Uuid,
    pub category: DataCategory,
}

impl CsvUploadRequest {
    pub fn validate(self) -> Result<UploadJob, AppError> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let (Some(file_url), Some(client_id), Some(data_type)) = (
            present(self.file_url),
            present(self.client_id),
            present(self.data_type),
        ) else {
            return Err(AppError::missing("fileUrl, clientId, dataType"));
        };

        let category = data_type.trim().parse()?;
        Ok(UploadJob {
            file_url,
            client_id: parse_client_id(&client_id)?,
            category,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub success: bool,
    pub records_processed: usize,
    pub records_inserted: usize,
    pub data_type: DataCategory,
}

async fn mark_file(store: &dyn Store, file_url: &str, outcome: FileOutcome) {
    if let Err(err) = store.mark_file(file_url, &outcome).await {
        warn!(file_url, error = %err, "failed to update uploaded file status");
    }
}

pub async fn process_upload(
    store: &dyn Store,
    fetcher: &dyn FileFetcher,
    job: &UploadJob,
    today: NaiveDate,
) -> Result<UploadSummary, AppError> {
    let rows = match fetch_rows(fetcher, &job.file_url).await {
        Ok(rows) => rows,
        Err(err) => {
            let outcome = FileOutcome {
                status: ProcessingStatus::Failed,
                results: ProcessingResults {
                    total_records: 0,
                    inserted_count: 0,
                    error: Some(err.to_string()),
                },
            };
            mark_file(store, &job.file_url, outcome).await;
            return Err(err);
        }
    };

    let batch = normalize(job.category, job.client_id, &rows, today);
    let dropped = rows.len() - batch.len();
    if dropped > 0 {
        info!(file_url = %job.file_url, dropped, "skipped rows without an identifying value");
    }

    let (inserted, insert_error) = if batch.is_empty() {
        (0, None)
    } else {
        match store.insert_batch(&batch).await {
            Ok(count) => (count, None),
            Err(err) => {
                warn!(
                    file_url = %job.file_url,
                    table = job.category.table(),
                    error = %err,
                    "bulk insert failed"
                );
                (0, Some(err.to_string()))
            }
        }
    };

    let outcome = FileOutcome {
        status: if insert_error.is_some() {
            ProcessingStatus::PartiallyFailed
        } else {
            ProcessingStatus::Completed
        },
        results: ProcessingResults {
            total_records: rows.len(),
            inserted_count: inserted,
            error: insert_error,
        },
    };
    mark_file(store, &job.file_url, outcome).await;

    info!(
        file_url = %job.file_url,
        data_type = job.category.as_str(),
        processed = rows.len(),
        inserted,
        "csv upload processed"
    );

    Ok(UploadSummary {
        success: true,
        records_processed: rows.len(),
        records_inserted: inserted,
        data_type: job.category,
    })
}

async fn fetch_rows(fetcher: &dyn FileFetcher, file_url: &str) -> Result<Vec<RawRow>, AppError> {
    let text = fetcher.fetch_text(file_url).await?;
    parse_rows(&text)
}
