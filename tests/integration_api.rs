//! API Integration Tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use unit_ledger::jobs::JobScheduler;

mod common;

use common::{app, send, setup_state};

fn cash_row(unit: &str, date: &str, direction: &str, amount: &str) -> Value {
    json!({
        "type": "kas_unit",
        "data": {
            "date": date,
            "unit": unit,
            "direction": direction,
            "category": "Operasional",
            "amount": amount
        }
    })
}

fn leave_request(unit: &str, reason: &str, source_id: Option<&str>) -> Value {
    let mut body = json!({
        "trigger": "leave_request_saved",
        "reason": reason,
        "unit": unit,
        "subject_name": "Ali",
        "date": "2024-01-10"
    });
    if let Some(source_id) = source_id {
        body["source_id"] = json!(source_id);
    }
    body
}

#[tokio::test]
async fn test_leave_request_posts_catalog_price() {
    let (state, _store) = setup_state();
    let app = app(state);

    // 1. Price the service
    let (status, _) = send(
        &app,
        "POST",
        "/data",
        Some(json!({
            "type": "layanan_info",
            "data": {"unit": "Keamanan", "service_name": "Izin Pulang", "price": "2000"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // 2. Post the leave request
    let (status, body) = send(&app, "POST", "/postings", Some(leave_request("Keamanan", "Pulang", None))).await;
    assert_eq!(status, StatusCode::CREATED, "posting failed: {}", body);
    assert_eq!(body["result"], "posted");
    assert_eq!(body["service_record"]["service_name"], "Izin Pulang");
    assert_eq!(body["service_record"]["amount"], "2000");
    assert_eq!(body["cash_movement"]["direction"], "Masuk");
    assert_eq!(body["cash_movement"]["amount"], "2000");
    assert_eq!(body["cash_movement"]["settlement_status"], "unsettled");
    assert_eq!(body["cash_movement"]["posting_id"], body["posting_id"]);
    assert_eq!(body["service_record"]["posting_id"], body["posting_id"]);

    // 3. The unit ledger shows the new row
    let (status, rows) = send(&app, "GET", "/data?type=kas_unit&unit=Keamanan&status=unsettled", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_catalog_price_overrides_default() {
    let (state, _store) = setup_state();
    let app = app(state);

    send(
        &app,
        "POST",
        "/data",
        Some(json!({
            "type": "layanan_info",
            "data": {"unit": "Keamanan", "service_name": "Izin Pulang", "price": "3500"}
        })),
    )
    .await;

    let (_, body) = send(&app, "POST", "/postings", Some(leave_request("Keamanan", "Pulang", None))).await;
    assert_eq!(body["cash_movement"]["amount"], "3500");

    // Without a catalog entry the rule default applies
    let (_, body) = send(&app, "POST", "/postings", Some(leave_request("Kesehatan", "Pulang", None))).await;
    assert_eq!(body["cash_movement"]["amount"], "2000");
}

#[tokio::test]
async fn test_unmapped_posting_is_skipped() {
    let (state, store) = setup_state();
    let app = app(state);

    let (status, body) = send(&app, "POST", "/postings", Some(leave_request("Keamanan", "Kegiatan", None))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "skipped");
    assert_eq!(store.counts().await, (0, 0, 0));
}

#[tokio::test]
async fn test_posting_blank_subject_is_rejected() {
    let (state, _store) = setup_state();
    let app = app(state);

    let mut request = leave_request("Keamanan", "Pulang", None);
    request["subject_name"] = json!("  ");

    let (status, body) = send(&app, "POST", "/postings", Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "validation_error");
}

#[tokio::test]
async fn test_hook_and_worker_post_once() {
    let (state, store) = setup_state();
    let scheduler = JobScheduler::new(state.outbox.clone());
    let app = app(state);

    let request = leave_request("Keamanan", "Pulang", Some("izin-42"));
    let (status, first) = send(&app, "POST", "/hooks/after-save", Some(request.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["accepted"], true);

    // The triggering module retries its hook call
    let (_, second) = send(&app, "POST", "/hooks/after-save", Some(request)).await;
    assert_eq!(first["pending_id"], second["pending_id"]);

    // Nothing is posted until the worker runs
    assert_eq!(store.counts().await, (0, 0, 0));

    let report = scheduler.run_all_once().await;
    assert_eq!(report.outbox.posted, 1);
    let report = scheduler.run_all_once().await;
    assert_eq!(report.outbox.claimed, 0);
    assert_eq!(store.counts().await, (1, 1, 0));

    let pending_id = first["pending_id"].as_str().unwrap();
    let (status, pending) = send(&app, "GET", &format!("/hooks/pending/{}", pending_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["status"], "completed");
    assert_eq!(pending["posting_id"], pending_id);

    // The staff member behind the hook call is recorded, not the automatic label
    let (_, records) = send(&app, "GET", "/data?type=layanan_admin", None).await;
    assert_eq!(records[0]["responsible_party"], "Bendahara Unit");
    let (_, cash) = send(&app, "GET", "/data?type=kas_unit", None).await;
    assert_eq!(cash[0]["responsible_party"], "Bendahara Unit");
}

#[tokio::test]
async fn test_settlement_e2e() {
    let (state, _store) = setup_state();
    let app = app(state);

    for (direction, amount) in [("Masuk", "2000"), ("Masuk", "50000"), ("Keluar", "1000")] {
        let (status, _) = send(&app, "POST", "/data", Some(cash_row("Keamanan", "2024-01-20", direction, amount))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // 1. Quote
    let (status, quote) = send(&app, "POST", "/settlements/quote", Some(json!({"unit": "Keamanan"}))).await;
    assert_eq!(status, StatusCode::OK, "quote failed: {}", quote);
    assert_eq!(quote["unit"], "Keamanan");
    assert_eq!(quote["amount"], "51000");
    assert_eq!(quote["rows"].as_array().unwrap().len(), 3);

    // 2. Confirm
    let quote_id = quote["quote_id"].as_str().unwrap();
    let (status, result) = send(&app, "POST", &format!("/settlements/{}/confirm", quote_id), None).await;
    assert_eq!(status, StatusCode::CREATED, "confirm failed: {}", result);
    assert_eq!(result["treasury_entry"]["amount"], "51000");
    assert_eq!(result["treasury_entry"]["category"], "Setoran Unit");
    assert_eq!(result["treasury_entry"]["note"], "Setoran Operasional Unit Keamanan");
    assert_eq!(result["settled_rows"].as_array().unwrap().len(), 3);

    // 3. Balances moved from unsettled to settled
    let (_, settled) = send(&app, "GET", "/units/Keamanan/balance?status=settled", None).await;
    assert_eq!(settled["net"], "51000");
    assert_eq!(settled["rows"], 3);
    let (_, unsettled) = send(&app, "GET", "/units/Keamanan/balance?status=Belum%20Setor", None).await;
    assert_eq!(unsettled["net"], "0");

    // 4. Treasury shows one deposit
    let (_, treasury) = send(&app, "GET", "/data?type=arus_kas", None).await;
    assert_eq!(treasury.as_array().unwrap().len(), 1);

    // 5. Nothing left to settle, and the quote is spent
    let (status, body) = send(&app, "POST", "/settlements/quote", Some(json!({"unit": "Keamanan"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_balance");

    let (status, body) = send(&app, "POST", &format!("/settlements/{}/confirm", quote_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "quote_not_found");
}

#[tokio::test]
async fn test_settlement_without_cash_is_rejected() {
    let (state, store) = setup_state();
    let app = app(state);

    let (status, body) = send(&app, "POST", "/settlements/quote", Some(json!({"unit": "Kesehatan"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_balance");
    assert!(body["details"].as_str().unwrap().contains("Kesehatan"));
    assert_eq!(store.counts().await.2, 0);

    let (status, body) = send(&app, "POST", "/settlements/quote", Some(json!({"unit": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "validation_error");
}

#[tokio::test]
async fn test_cancelled_quote_cannot_be_confirmed() {
    let (state, _store) = setup_state();
    let app = app(state);

    send(&app, "POST", "/data", Some(cash_row("Dapur", "2024-03-01", "Masuk", "7000"))).await;
    let (_, quote) = send(&app, "POST", "/settlements/quote", Some(json!({"unit": "Dapur"}))).await;
    let quote_id = quote["quote_id"].as_str().unwrap();

    let (status, _) = send(&app, "DELETE", &format!("/settlements/{}", quote_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "POST", &format!("/settlements/{}/confirm", quote_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, unsettled) = send(&app, "GET", "/units/Dapur/balance?status=unsettled", None).await;
    assert_eq!(unsettled["net"], "7000");
}

#[tokio::test]
async fn test_manual_status_transitions() {
    let (state, _store) = setup_state();
    let app = app(state);

    let (_, row) = send(&app, "POST", "/data", Some(cash_row("Keamanan", "2024-01-20", "Masuk", "2000"))).await;
    let id = row["id"].as_str().unwrap();
    assert_eq!(row["version"], 1);
    assert_eq!(row["responsible_party"], "Bendahara Unit");

    let uri = format!("/units/Keamanan/cash/{}/status", id);
    let (status, body) = send(&app, "POST", &uri, Some(json!({"to": "settled"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_status_transition");

    let (status, body) = send(&app, "POST", &uri, Some(json!({"to": "in_progress", "expected_version": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settlement_status"], "in_progress");
    assert_eq!(body["version"], 2);

    // Stale version
    let (status, body) = send(&app, "POST", &uri, Some(json!({"to": "unsettled", "expected_version": 1}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "version_conflict");

    // Wrong unit
    let (status, _) = send(&app, "POST", &format!("/units/Dapur/cash/{}/status", id), Some(json!({"to": "unsettled"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_monthly_recap_marks_deficit() {
    let (state, _store) = setup_state();
    let app = app(state);

    send(&app, "POST", "/data", Some(cash_row("Dapur", "2024-01-05", "Masuk", "5000"))).await;
    send(&app, "POST", "/data", Some(cash_row("Dapur", "2024-02-05", "Keluar", "2000"))).await;

    let (status, recap) = send(&app, "GET", "/recap/monthly?source=unit&unit=Dapur&year=2024", None).await;
    assert_eq!(status, StatusCode::OK);
    let periods = recap.as_array().unwrap();
    assert_eq!(periods.len(), 2);
    assert_eq!(periods[0]["period"], "2024-02");
    assert_eq!(periods[0]["label"], "Februari 2024");
    assert_eq!(periods[0]["status"], "Deficit");
    assert_eq!(periods[1]["period"], "2024-01");
    assert_eq!(periods[1]["status"], "Surplus");

    let (_, recap) = send(&app, "GET", "/recap/monthly?source=unit&unit=Dapur&order=asc&filter=januari", None).await;
    let periods = recap.as_array().unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0]["net"], "5000");

    let (status, _) = send(&app, "GET", "/recap/monthly?source=unit", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_combined_recap_counts_settled_cash_once() {
    let (state, _store) = setup_state();
    let app = app(state);

    send(&app, "POST", "/data", Some(cash_row("Keamanan", "2024-01-20", "Masuk", "4000"))).await;
    let (_, before) = send(&app, "GET", "/recap/yearly?source=combined", None).await;
    assert_eq!(before[0]["inflow"], "4000");

    let (_, quote) = send(&app, "POST", "/settlements/quote", Some(json!({"unit": "Keamanan"}))).await;
    let quote_id = quote["quote_id"].as_str().unwrap();
    send(&app, "POST", &format!("/settlements/{}/confirm", quote_id), None).await;

    // The deposit replaces the swept rows; total inflow is unchanged
    let (_, after) = send(&app, "GET", "/recap/yearly?source=combined", None).await;
    let total: i64 = after
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["inflow"].as_str().unwrap().parse::<i64>().unwrap())
        .sum();
    assert_eq!(total, 4000);
}

#[tokio::test]
async fn test_data_rejects_unknown_status() {
    let (state, _store) = setup_state();
    let app = app(state);

    let (status, body) = send(&app, "GET", "/data?type=kas_unit&status=lunas", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");

    let (status, _) = send(&app, "GET", "/data?type=gaji", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let (state, _store) = setup_state();
    let app = app(state);
    let correlation_id = Uuid::new_v4();

    let request = Request::builder()
        .method("GET")
        .uri("/data?type=layanan_info")
        .header("X-Correlation-Id", correlation_id.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-correlation-id").unwrap().to_str().unwrap(),
        correlation_id.to_string()
    );
}
