// Router tests: stub analyzer, static tokens, in-memory store

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use hsa_ledger::api::{build_router, AppState};
use hsa_ledger::{
    AppConfig, ExpenseStore, LedgerError, ReceiptAnalyzer, ReceiptImage, StaticTokenVerifier,
    TokenEntry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "test-token";
const OTHER_TOKEN: &str = "other-token";
const TINY_PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

const PHARMACY: &str = "```json\n{\"date\":\"2024-03-01\",\"merchant\":\"Pharmacy\",\"taxRate\":\"8\",\"items\":[{\"name\":\"Aspirin\",\"price\":10.00,\"HealthSpendingAccountEligible\":true},{\"name\":\"Candy\",\"price\":2.00,\"HealthSpendingAccountEligible\":false},]}\n```";

enum Stub {
    Reply(&'static str),
    Fail,
    Unconfigured,
}

#[async_trait]
impl ReceiptAnalyzer for Stub {
    async fn analyze(&self, _image: &ReceiptImage) -> Result<String, LedgerError> {
        match self {
            Stub::Reply(text) => Ok(text.to_string()),
            Stub::Fail | Stub::Unconfigured => Err(LedgerError::Service("upstream 503".to_string())),
        }
    }

    fn is_configured(&self) -> bool {
        !matches!(self, Stub::Unconfigured)
    }
}

fn app_with(analyzer: Stub) -> (Router, ExpenseStore) {
    let store = ExpenseStore::in_memory().unwrap();
    let verifier = StaticTokenVerifier::new(&[
        TokenEntry {
            token: TOKEN.to_string(),
            uid: "user-1".to_string(),
            email: None,
        },
        TokenEntry {
            token: OTHER_TOKEN.to_string(),
            uid: "user-2".to_string(),
            email: None,
        },
    ]);
    let state = AppState::new(store.clone(), Arc::new(analyzer), Arc::new(verifier));
    (build_router(state, &AppConfig::default()), store)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, req).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn manual(date: &str, item: &str, price: f64) -> Value {
    json!({ "date": date, "merchant": "CVS", "itemName": item, "price": price, "tax": 0.0 })
}

#[tokio::test]
async fn health_needs_no_auth() {
    let (app, _) = app_with(Stub::Reply("{}"));
    let (status, body) = send_json(&app, request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    let (app, _) = app_with(Stub::Reply("{}"));

    let body = json!({ "imageData": TINY_PNG });
    let (status, json) =
        send_json(&app, request("POST", "/api/receipts/analyze", None, Some(body.clone()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Unauthorized");

    let (status, _) =
        send_json(&app, request("POST", "/api/receipts/analyze", Some("forged"), Some(body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn analyze_returns_cleaned_text() {
    let (app, store) = app_with(Stub::Reply(PHARMACY));
    let (status, json) = send_json(
        &app,
        request("POST", "/api/receipts/analyze", Some(TOKEN), Some(json!({ "imageData": TINY_PNG }))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let text = json["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed["merchant"], "Pharmacy");
    // Analysis alone writes nothing
    assert_eq!(store.count("user-1").unwrap(), 0);
}

#[tokio::test]
async fn analyze_failures_use_fixed_messages() {
    let (app, _) = app_with(Stub::Unconfigured);
    let (status, json) = send_json(
        &app,
        request("POST", "/api/receipts/analyze", Some(TOKEN), Some(json!({ "imageData": TINY_PNG }))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Gemini API key not configured");

    let (app, _) = app_with(Stub::Fail);
    let (status, json) = send_json(
        &app,
        request("POST", "/api/receipts/analyze", Some(TOKEN), Some(json!({ "imageData": TINY_PNG }))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to analyze receipt");
}

#[tokio::test]
async fn analyze_rejects_non_image_payload() {
    let (app, _) = app_with(Stub::Reply(PHARMACY));
    let (status, json) = send_json(
        &app,
        request("POST", "/api/receipts/analyze", Some(TOKEN), Some(json!({ "imageData": "/tmp/r.jpg" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Unsupported image format");
}

#[tokio::test]
async fn record_writes_eligible_items() {
    let (app, store) = app_with(Stub::Reply(PHARMACY));
    let (status, json) = send_json(
        &app,
        request("POST", "/api/receipts/record", Some(TOKEN), Some(json!({ "imageData": TINY_PNG }))),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["itemsOnReceipt"], 2);
    let records = json["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["itemName"], "Aspirin");
    assert_eq!(records[0]["tax"], 0.8);
    assert_eq!(records[0]["totalPrice"], 10.8);
    assert_eq!(store.count("user-1").unwrap(), 1);
}

#[tokio::test]
async fn record_parse_failure_is_422_and_writes_nothing() {
    let (app, store) = app_with(Stub::Reply("Sorry, I could not read this receipt."));
    let (status, json) = send_json(
        &app,
        request("POST", "/api/receipts/record", Some(TOKEN), Some(json!({ "imageData": TINY_PNG }))),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "Unable to parse the receipt data. Please try again.");
    assert_eq!(store.count("user-1").unwrap(), 0);
}

#[tokio::test]
async fn expense_crud_is_owner_scoped() {
    let (app, _) = app_with(Stub::Reply("{}"));

    let (status, created) = send_json(
        &app,
        request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-03-01", "Eye drops", 7.49))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["totalPrice"], 7.49);
    assert_eq!(created["source"], "manual");
    let id = created["id"].as_str().unwrap().to_string();

    // Another user can neither see nor edit it
    let (_, other_list) = send_json(&app, request("GET", "/api/expenses", Some(OTHER_TOKEN), None)).await;
    assert_eq!(other_list["totalItems"], 0);
    let (status, _) = send_json(
        &app,
        request("PUT", &format!("/api/expenses/{}", id), Some(OTHER_TOKEN), Some(json!({ "reimbursed": true }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = send_json(
        &app,
        request("PUT", &format!("/api/expenses/{}", id), Some(TOKEN), Some(json!({ "reimbursed": true }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["reimbursed"], true);
    assert_eq!(updated["itemName"], "Eye drops");

    let (status, _) = send(&app, request("DELETE", &format!("/api/expenses/{}", id), Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("DELETE", &format!("/api/expenses/{}", id), Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_year_and_search() {
    let (app, _) = app_with(Stub::Reply("{}"));
    for (date, item, price) in [
        ("2024-03-01", "Aspirin", 10.80),
        ("2024-07-04", "Sunscreen SPF 50", 12.00),
        ("2023-12-31", "Thermometer", 12.75),
    ] {
        send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual(date, item, price)))).await;
    }

    let (status, all) = send_json(&app, request("GET", "/api/expenses", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["totalItems"], 3);
    assert_eq!(all["taxYears"], json!([2024, 2023]));
    assert_eq!(all["total"], 35.55);

    let (_, year) = send_json(&app, request("GET", "/api/expenses?year=2023", Some(TOKEN), None)).await;
    assert_eq!(year["totalItems"], 1);
    assert_eq!(year["items"][0]["itemName"], "Thermometer");
    // Year list is not narrowed by the filter
    assert_eq!(year["taxYears"], json!([2024, 2023]));

    let (_, search) = send_json(&app, request("GET", "/api/expenses?search=sunscreen", Some(TOKEN), None)).await;
    assert_eq!(search["totalItems"], 1);

    let (_, paged) = send_json(&app, request("GET", "/api/expenses?page=2&per_page=2", Some(TOKEN), None)).await;
    assert_eq!(paged["items"].as_array().unwrap().len(), 1);
    assert_eq!(paged["totalPages"], 2);

    let (status, _) = send_json(&app, request("GET", "/api/expenses?year=soon", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_is_a_csv_attachment_with_total_row() {
    let (app, _) = app_with(Stub::Reply("{}"));
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-03-01", "Aspirin", 10.80)))).await;
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-04-01", "Bandages", 4.20)))).await;
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2023-04-01", "Crutches", 40.00)))).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/api/expenses/export?year=2024", Some(TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains("HSA_Expenses_2024.csv"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let mut reader = csv::Reader::from_reader(bytes.as_ref());
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();

    assert_eq!(rows.len(), 3);
    let total_row = rows.last().unwrap();
    assert_eq!(&total_row[2], "Total");
    assert_eq!(&total_row[5], "15.00");
}

#[tokio::test]
async fn summary_returns_chart_series() {
    let (app, _) = app_with(Stub::Reply("{}"));
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-03-01", "Aspirin", 10.80)))).await;
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-03-20", "Bandages", 4.20)))).await;

    let (status, summary) = send_json(&app, request("GET", "/api/expenses/summary", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["monthly"].as_array().unwrap().len(), 12);
    assert_eq!(summary["monthly"][2]["total"], 15.0);
    assert_eq!(summary["byMerchant"][0]["merchant"], "CVS");
    assert_eq!(summary["reimbursement"]["outstanding"], 15.0);
}

#[tokio::test]
async fn malformed_requests_answer_with_json_errors() {
    let (app, store) = app_with(Stub::Reply(PHARMACY));

    // Body without imageData
    let (status, json) =
        send_json(&app, request("POST", "/api/receipts/analyze", Some(TOKEN), Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("imageData"));

    // Body that is not JSON at all
    let broken = Request::builder()
        .method("POST")
        .uri("/api/receipts/record")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"imageData\": "))
        .unwrap();
    let (status, json) = send_json(&app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
    assert_eq!(store.count("user-1").unwrap(), 0);

    // Query string that does not fit ListParams
    let (status, json) =
        send_json(&app, request("GET", "/api/expenses?page=first", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    // Manual add with a wrongly typed field
    let (status, json) = send_json(
        &app,
        request("POST", "/api/expenses", Some(TOKEN), Some(json!({ "date": "2024-03-01", "merchant": "CVS", "itemName": "Aspirin", "price": "ten" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn inline_edit_accepts_display_dates() {
    let (app, _) = app_with(Stub::Reply("{}"));
    let (_, created) = send_json(
        &app,
        request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-03-01", "Eye drops", 7.49))),
    )
    .await;
    let uri = format!("/api/expenses/{}", created["id"].as_str().unwrap());

    let (status, updated) =
        send_json(&app, request("PUT", &uri, Some(TOKEN), Some(json!({ "date": "March 15, 2024" })))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["date"], "2024-03-15");

    let (status, json) =
        send_json(&app, request("PUT", &uri, Some(TOKEN), Some(json!({ "date": "someday" })))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("someday"));
}

/// Read the next non-comment server-sent event as (event name, JSON data)
async fn next_sse_event(body: &mut Body, buffer: &mut String) -> (String, Value) {
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let block: String = buffer.drain(..end + 2).collect();
            let mut event = String::new();
            let mut data = String::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = name.trim().to_string();
                } else if let Some(chunk) = line.strip_prefix("data:") {
                    data.push_str(chunk.trim_start());
                }
            }
            if data.is_empty() {
                continue;
            }
            return (event, serde_json::from_str(&data).unwrap());
        }

        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("no event within 5s")
            .expect("stream ended")
            .unwrap();
        if let Ok(bytes) = frame.into_data() {
            buffer.push_str(std::str::from_utf8(&bytes).unwrap());
        }
    }
}

#[tokio::test]
async fn stream_sends_full_snapshot_per_change() {
    let (app, _) = app_with(Stub::Reply("{}"));
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-03-01", "Aspirin", 10.80)))).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/api/expenses/stream", Some(TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut body = response.into_body();
    let mut buffer = String::new();

    let (event, first) = next_sse_event(&mut body, &mut buffer).await;
    assert_eq!(event, "snapshot");
    assert_eq!(first.as_array().unwrap().len(), 1);
    assert_eq!(first[0]["itemName"], "Aspirin");

    // Another owner's write produces no event for this stream
    send(&app, request("POST", "/api/expenses", Some(OTHER_TOKEN), Some(manual("2024-05-01", "Crutches", 40.00)))).await;
    send(&app, request("POST", "/api/expenses", Some(TOKEN), Some(manual("2024-04-02", "Bandages", 4.20)))).await;

    let (event, second) = next_sse_event(&mut body, &mut buffer).await;
    assert_eq!(event, "snapshot");
    let names: Vec<_> = second
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["itemName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Bandages", "Aspirin"]);
}

#[tokio::test]
async fn stream_requires_a_token() {
    let (app, _) = app_with(Stub::Reply("{}"));
    let (status, json) = send_json(&app, request("GET", "/api/expenses/stream", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Unauthorized");
}
