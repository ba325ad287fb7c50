//! Common test utilities

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware, Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

use unit_ledger::api;
use unit_ledger::posting::RuleTable;
use unit_ledger::store::InMemoryLedgerStore;
use unit_ledger::{AppState, Config};

/// Fresh in-memory state with the built-in posting rules
pub fn setup_state() -> (AppState, Arc<InMemoryLedgerStore>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let state = AppState::new(store.clone(), &Config::in_memory(), RuleTable::builtin());
    (state, store)
}

/// The API router with its request middleware, as mounted under `/api/v1`
pub fn app(state: AppState) -> Router {
    api::create_router()
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(middleware::from_fn(api::middleware::context_middleware))
        .with_state(state)
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Actor", "Bendahara Unit");

    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // Extractor rejections answer in plain text
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
