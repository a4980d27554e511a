mod common;

use std::sync::atomic::Ordering;

use agency_insights::models::{KeywordRecord, NormalizedBatch, PerformanceStatus, ProcessingStatus};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{build_test_context, post_json, send};
use serde_json::json;
use uuid::Uuid;

const PERFORMANCE: &str = "/functions/v1/calculate-performance";
const PROCESS_CSV: &str = "/functions/v1/process-csv";
const AI_ANALYSIS: &str = "/functions/v1/ai-analysis";

const KEYWORDS_URL: &str = "https://files.example/client-files/keywords.csv";

#[tokio::test]
async fn growing_client_is_marked_green() {
    let ctx = build_test_context(&[], None);
    let client_id = Uuid::new_v4();
    ctx.store.add_day(client_id, 1, 210.0, 7.0, 1.0);
    ctx.store.add_day(client_id, 2, 230.0, 5.0, 1.0);
    ctx.store.add_day(client_id, 8, 190.0, 6.0, 2.0);
    ctx.store.add_day(client_id, 9, 210.0, 5.0, 1.0);

    let (status, body) = post_json(&ctx.app, PERFORMANCE, json!({ "clientId": client_id })).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["clientId"], client_id.to_string());
    assert_eq!(data["performanceStatus"], "green");
    assert_eq!(data["trend"], "improved");
    assert_eq!(data["metrics"]["currentTraffic"], 220);
    assert_eq!(data["metrics"]["previousTraffic"], 200);
    assert_eq!(data["metrics"]["trafficChange"], 10.0);
    assert_eq!(data["metrics"]["currentRankings"], 5);
    assert_eq!(data["metrics"]["previousRankings"], 4);
    assert_eq!(data["metrics"]["rankingChange"], 25.0);
    assert_eq!(ctx.store.status_of(client_id), Some(PerformanceStatus::Green));
}

#[tokio::test]
async fn traffic_collapse_is_marked_red() {
    let ctx = build_test_context(&[], None);
    let client_id = Uuid::new_v4();
    ctx.store.add_day(client_id, 0, 80.0, 10.0, 0.0);
    ctx.store.add_day(client_id, 12, 100.0, 1.0, 0.0);

    let (status, body) = post_json(&ctx.app, PERFORMANCE, json!({ "clientId": client_id })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["metrics"]["trafficChange"], -20.0);
    assert_eq!(body["data"]["performanceStatus"], "red");
    assert_eq!(ctx.store.status_of(client_id), Some(PerformanceStatus::Red));
}

#[tokio::test]
async fn day_seven_belongs_to_current_window() {
    let ctx = build_test_context(&[], None);
    let client_id = Uuid::new_v4();
    ctx.store.add_day(client_id, 7, 50.0, 0.0, 0.0);
    ctx.store.add_day(client_id, 14, 100.0, 0.0, 0.0);

    let (_, body) = post_json(&ctx.app, PERFORMANCE, json!({ "clientId": client_id })).await;

    assert_eq!(body["data"]["metrics"]["currentTraffic"], 50);
    assert_eq!(body["data"]["metrics"]["previousTraffic"], 100);
    assert_eq!(body["data"]["performanceStatus"], "red");
}

#[tokio::test]
async fn client_without_data_is_green_but_insufficient() {
    let ctx = build_test_context(&[], None);
    let client_id = Uuid::new_v4();

    let (status, body) = post_json(&ctx.app, PERFORMANCE, json!({ "clientId": client_id })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["performanceStatus"], "green");
    assert_eq!(body["data"]["trend"], "insufficient");
    assert_eq!(body["data"]["metrics"]["trafficChange"], 0.0);
    assert_eq!(ctx.store.status_of(client_id), Some(PerformanceStatus::Green));
}

#[tokio::test]
async fn missing_client_id_is_reported_in_envelope() {
    let ctx = build_test_context(&[], None);

    let (status, body) = post_json(&ctx.app, PERFORMANCE, json!({})).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "PERFORMANCE_CALCULATION_FAILED");
    assert_eq!(body["error"]["message"], "clientId is required");
}

#[tokio::test]
async fn read_failure_leaves_status_untouched() {
    let ctx = build_test_context(&[], None);
    let client_id = Uuid::new_v4();
    ctx.store.fail_reads.store(true, Ordering::SeqCst);

    let (status, body) = post_json(&ctx.app, PERFORMANCE, json!({ "clientId": client_id })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "PERFORMANCE_CALCULATION_FAILED");
    assert_eq!(ctx.store.status_of(client_id), None);
}

#[tokio::test]
async fn malformed_body_uses_error_envelope() {
    let ctx = build_test_context(&[], None);
    let req = Request::builder()
        .method("POST")
        .uri(PERFORMANCE)
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&ctx.app, req).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "PERFORMANCE_CALCULATION_FAILED");
}

#[tokio::test]
async fn body_without_content_type_is_accepted() {
    let ctx = build_test_context(&[], None);
    let client_id = Uuid::new_v4();
    ctx.store.add_day(client_id, 1, 100.0, 1.0, 0.0);
    let req = Request::builder()
        .method("POST")
        .uri(PERFORMANCE)
        .body(Body::from(json!({ "clientId": client_id }).to_string()))
        .unwrap();

    let (status, body) = send(&ctx.app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["performanceStatus"], "green");
    assert_eq!(body["data"]["trend"], "insufficient");
}

#[tokio::test]
async fn empty_cell_rows_count_as_processed() {
    let csv = "keyword,volume\nboiler,1\n,\n";
    let ctx = build_test_context(&[(KEYWORDS_URL, csv)], None);

    let (status, body) = post_json(
        &ctx.app,
        PROCESS_CSV,
        json!({ "fileUrl": KEYWORDS_URL, "clientId": Uuid::new_v4(), "dataType": "keywords" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recordsProcessed"], 2);
    assert_eq!(body["data"]["recordsInserted"], 1);
}

#[tokio::test]
async fn keyword_csv_is_normalized_and_inserted() {
    let csv = "Keyword,Search Volume,Position\n\"local plumber\",1900,3\n";
    let ctx = build_test_context(&[(KEYWORDS_URL, csv)], None);
    let client_id = Uuid::new_v4();

    let (status, body) = post_json(
        &ctx.app,
        PROCESS_CSV,
        json!({ "fileUrl": KEYWORDS_URL, "clientId": client_id, "dataType": "keywords" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "success": true,
            "recordsProcessed": 1,
            "recordsInserted": 1,
            "dataType": "keywords"
        })
    );

    let batches = ctx.store.batches.lock().unwrap().clone();
    assert_eq!(
        batches,
        vec![NormalizedBatch::Keywords(vec![KeywordRecord {
            client_id,
            keyword: "local plumber".to_string(),
            search_volume: 1900,
            current_position: 3,
            difficulty: 0,
            cpc: 0.0,
            url: String::new(),
        }])]
    );

    let outcome = ctx.store.file_outcome(KEYWORDS_URL).unwrap();
    assert_eq!(outcome.status, ProcessingStatus::Completed);
    assert_eq!(outcome.results.total_records, 1);
    assert_eq!(outcome.results.inserted_count, 1);
}

#[tokio::test]
async fn rows_without_keyword_count_as_processed_only() {
    let csv = "keyword,volume\nboiler repair,480\n,260\n";
    let ctx = build_test_context(&[(KEYWORDS_URL, csv)], None);

    let (status, body) = post_json(
        &ctx.app,
        PROCESS_CSV,
        json!({ "fileUrl": KEYWORDS_URL, "clientId": Uuid::new_v4(), "dataType": "keywords" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recordsProcessed"], 2);
    assert_eq!(body["data"]["recordsInserted"], 1);
}

#[tokio::test]
async fn insert_failure_marks_file_partially_failed() {
    let csv = "competitor,da\nrival.example,44\n";
    let url = "https://files.example/client-files/competitors.csv";
    let ctx = build_test_context(&[(url, csv)], None);
    ctx.store.fail_inserts.store(true, Ordering::SeqCst);

    let (status, body) = post_json(
        &ctx.app,
        PROCESS_CSV,
        json!({ "fileUrl": url, "clientId": Uuid::new_v4(), "dataType": "competitors" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recordsProcessed"], 1);
    assert_eq!(body["data"]["recordsInserted"], 0);

    let outcome = ctx.store.file_outcome(url).unwrap();
    assert_eq!(outcome.status, ProcessingStatus::PartiallyFailed);
    assert_eq!(outcome.results.inserted_count, 0);
    assert!(outcome.results.error.unwrap().contains("store unavailable"));
}

#[tokio::test]
async fn unreachable_file_fails_and_is_marked() {
    let ctx = build_test_context(&[], None);
    let url = "https://files.example/client-files/missing.csv";

    let (status, body) = post_json(
        &ctx.app,
        PROCESS_CSV,
        json!({ "fileUrl": url, "clientId": Uuid::new_v4(), "dataType": "backlinks" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "CSV_PROCESSING_FAILED");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to download CSV file"));
    assert_eq!(
        ctx.store.file_outcome(url).map(|o| o.status),
        Some(ProcessingStatus::Failed)
    );
}

#[tokio::test]
async fn unsupported_data_type_is_rejected_before_fetching() {
    let ctx = build_test_context(&[(KEYWORDS_URL, "keyword\nx\n")], None);

    let (status, body) = post_json(
        &ctx.app,
        PROCESS_CSV,
        json!({ "fileUrl": KEYWORDS_URL, "clientId": Uuid::new_v4(), "dataType": "rankings" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "Unsupported data type: rankings");
    assert!(ctx.store.file_outcome(KEYWORDS_URL).is_none());
}

#[tokio::test]
async fn preflight_returns_empty_ok() {
    let ctx = build_test_context(&[], None);
    let req = Request::builder()
        .method("OPTIONS")
        .uri(PROCESS_CSV)
        .header("Origin", "https://dashboard.example")
        .header("Access-Control-Request-Method", "POST")
        .body(Body::empty())
        .unwrap();

    let resp = tower::util::ServiceExt::oneshot(ctx.app.clone(), req)
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn bare_options_request_is_ok() {
    let ctx = build_test_context(&[], None);
    let req = Request::builder()
        .method("OPTIONS")
        .uri(PERFORMANCE)
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&ctx.app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn analysis_is_generated_and_saved() {
    let ctx = build_test_context(&[], Some("Target \"emergency plumber\" next."));
    let client_id = Uuid::new_v4();

    let (status, body) = post_json(
        &ctx.app,
        AI_ANALYSIS,
        json!({
            "clientId": client_id,
            "analysisType": "keyword_opportunities",
            "data": [{ "keyword": "local plumber", "position": 3 }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["analysis"], "Target \"emergency plumber\" next.");
    assert_eq!(body["data"]["type"], "keyword_opportunities");
    assert_eq!(body["data"]["clientId"], client_id.to_string());

    let saved = ctx.store.ai_responses.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].tokens_used, 42);
    assert_eq!(saved[0].response_type, "keyword_opportunities");

    let prompts = ctx.generator.as_ref().unwrap().prompts.lock().unwrap().clone();
    assert!(prompts[0].contains("local plumber"));
}

#[tokio::test]
async fn analysis_without_provider_fails() {
    let ctx = build_test_context(&[], None);

    let (status, body) = post_json(
        &ctx.app,
        AI_ANALYSIS,
        json!({ "clientId": Uuid::new_v4(), "analysisType": "performance_summary" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "AI_ANALYSIS_FAILED");
    assert!(ctx.store.ai_responses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let ctx = build_test_context(&[], None);
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&ctx.app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
