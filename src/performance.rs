use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{parse_client_id, PerformanceStatus, SeoPerformanceRecord, Trend};
use crate::store::Store;

pub const WINDOW_DAYS: i64 = 7;

const RED_THRESHOLD: f64 = -10.0;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// `[today - 7, today]`, both ends inclusive.
pub fn current_window(today: NaiveDate) -> Window {
    Window {
        start: today - Duration::days(WINDOW_DAYS),
        end: today + Duration::days(1),
    }
}

/// `[today - 14, today - 7)`.
pub fn previous_window(today: NaiveDate) -> Window {
    Window {
        start: today - Duration::days(WINDOW_DAYS * 2),
        end: today - Duration::days(WINDOW_DAYS),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowSummary {
    pub traffic: f64,
    pub ranking_delta: f64,
    pub samples: usize,
}

pub fn summarize_window(records: &[SeoPerformanceRecord]) -> WindowSummary {
    if records.is_empty() {
        return WindowSummary::default();
    }

    let count = records.len() as f64;
    let mean = |field: fn(&SeoPerformanceRecord) -> f64| {
        records.iter().map(field).sum::<f64>() / count
    };

    WindowSummary {
        traffic: mean(|r| r.organic_traffic),
        ranking_delta: mean(|r| r.keyword_rankings_improved) - mean(|r| r.keyword_rankings_declined),
        samples: records.len(),
    }
}

pub fn traffic_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

pub fn ranking_change(current: f64, previous: f64) -> f64 {
    if previous != 0.0 {
        (current - previous) / previous.abs() * 100.0
    } else {
        0.0
    }
}

pub fn classify(traffic_change: f64, ranking_change: f64) -> PerformanceStatus {
    if traffic_change < RED_THRESHOLD || ranking_change < RED_THRESHOLD {
        PerformanceStatus::Red
    } else if traffic_change < 0.0 || ranking_change < 0.0 {
        PerformanceStatus::Yellow
    } else {
        PerformanceStatus::Green
    }
}

pub fn trend(
    current: &WindowSummary,
    previous: &WindowSummary,
    traffic_change: f64,
    ranking_change: f64,
) -> Trend {
    if current.samples == 0 || previous.samples == 0 {
        Trend::Insufficient
    } else if traffic_change < 0.0 || ranking_change < 0.0 {
        Trend::Declined
    } else if traffic_change > 0.0 || ranking_change > 0.0 {
        Trend::Improved
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRequest {
    pub client_id: Option<String>,
}

impl PerformanceRequest {
    pub fn validate(self) -> Result<Uuid, AppError> {
        match self.client_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => parse_client_id(&id),
            None => Err(AppError::Validation("clientId is required".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub current_traffic: i64,
    pub previous_traffic: i64,
    pub traffic_change: f64,
    pub current_rankings: i64,
    pub previous_rankings: i64,
    pub ranking_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub client_id: Uuid,
    pub performance_status: PerformanceStatus,
    pub trend: Trend,
    pub metrics: PerformanceMetrics,
}

// Halves round toward positive infinity: -0.5 becomes 0, not -1.
fn round_half_up(value: f64) -> f64 {
    // Adding 0.0 folds -0.0 into 0.0.
    (value + 0.5).floor() + 0.0
}

fn round_whole(value: f64) -> i64 {
    round_half_up(value) as i64
}

fn round_tenth(value: f64) -> f64 {
    round_half_up(value * 10.0) / 10.0 + 0.0
}

pub fn assess(
    client_id: Uuid,
    current: &[SeoPerformanceRecord],
    previous: &[SeoPerformanceRecord],
) -> PerformanceReport {
    let current = summarize_window(current);
    let previous = summarize_window(previous);

    let traffic = traffic_change(current.traffic, previous.traffic);
    let ranking = ranking_change(current.ranking_delta, previous.ranking_delta);

    PerformanceReport {
        client_id,
        performance_status: classify(traffic, ranking),
        trend: trend(&current, &previous, traffic, ranking),
        metrics: PerformanceMetrics {
            current_traffic: round_whole(current.traffic),
            previous_traffic: round_whole(previous.traffic),
            traffic_change: round_tenth(traffic),
            current_rankings: round_whole(current.ranking_delta),
            previous_rankings: round_whole(previous.ranking_delta),
            ranking_change: round_tenth(ranking),
        },
    }
}

async fn load_windows(
    store: &dyn Store,
    client_id: Uuid,
    today: NaiveDate,
) -> Result<(Vec<SeoPerformanceRecord>, Vec<SeoPerformanceRecord>), AppError> {
    let current = current_window(today);
    let previous = previous_window(today);
    let current_rows = store
        .performance_between(client_id, current.start, current.end)
        .await?;
    let previous_rows = store
        .performance_between(client_id, previous.start, previous.end)
        .await?;
    Ok((current_rows, previous_rows))
}

pub async fn preview_client(
    store: &dyn Store,
    client_id: Uuid,
    today: NaiveDate,
) -> Result<PerformanceReport, AppError> {
    let (current, previous) = load_windows(store, client_id, today).await?;
    Ok(assess(client_id, &current, &previous))
}

/// Evaluates the client and stores the resulting status. The status write
/// only happens once both windows were read.
pub async fn evaluate_client(
    store: &dyn Store,
    client_id: Uuid,
    today: NaiveDate,
) -> Result<PerformanceReport, AppError> {
    let report = preview_client(store, client_id, today).await?;

    store
        .set_performance_status(client_id, report.performance_status, Utc::now())
        .await?;

    info!(
        %client_id,
        status = %report.performance_status,
        trend = ?report.trend,
        traffic_change = report.metrics.traffic_change,
        ranking_change = report.metrics.ranking_change,
        "performance status updated"
    );

    Ok(report)
}
