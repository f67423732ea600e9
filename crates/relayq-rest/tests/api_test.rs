//! Router tests driven with `tower::ServiceExt::oneshot` against the
//! in-process store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use relayq_config::ServerConfig;
use relayq_jobs::{BackingStore, JobDefaults, JobQueue, MemoryStore, QueueKeys};
use relayq_rest::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const KEY: &str = "test-key";

fn app() -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new());
    let queue = JobQueue::new(store.clone(), QueueKeys::default(), JobDefaults::default());
    let router = create_router(AppState::new(queue, KEY), &ServerConfig::default(), "/metrics");
    (store, router)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_job(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header("x-api-key", KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", KEY)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let (_, router) = app();
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_pings_store() {
    let (_, router) = app();
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_enqueue_then_status() {
    let (store, router) = app();
    let (status, body) = send(&router, post_job(json!({"type": "echo.process", "payload": {"msg": "hi"}}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(store.log_len("jobs:stream"), 1);

    let (status, record) = send(&router, get(&format!("/jobs/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "queued");
    assert_eq!(record["type"], "echo.process");
}

#[tokio::test]
async fn test_enqueue_future_job_is_scheduled() {
    let (store, router) = app();
    let at = relayq_jobs::now_unix() + 60;
    let (status, body) = send(
        &router,
        post_job(json!({"type": "echo.process", "payload": {}, "scheduled_at": at})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(store.set_len("jobs:scheduled"), 1);

    let (_, record) = send(&router, get(&format!("/jobs/{}", body["id"].as_str().unwrap()))).await;
    assert_eq!(record["status"], "scheduled");
    assert_eq!(record["scheduled_at"], at.to_string());
}

#[tokio::test]
async fn test_enqueue_validation() {
    let (store, router) = app();

    let (status, body) = send(&router, post_job(json!({"payload": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(&router, post_job(json!({"type": "echo.process"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .header("x-api-key", KEY)
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.log_len("jobs:stream"), 0);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let (store, router) = app();
    let (status, body) = send(&router, get("/jobs/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(store.hash_read_all("jobs:job:does-not-exist").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_api_key_required() {
    let (_, router) = app();

    let request = Request::builder().uri("/dlq").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/dlq")
        .header("x-api-key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dlq_lists_entries_verbatim() {
    let (store, router) = app();
    let (status, body) = send(&router, get("/dlq")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    store
        .append("jobs:dlq", &[("job", "{}"), ("error", "boom"), ("failed_at", "5")])
        .await
        .unwrap();
    let (_, body) = send(&router, get("/dlq")).await;
    assert_eq!(body, json!([{"job": "{}", "error": "boom", "failed_at": "5"}]));
}

#[tokio::test]
async fn test_metrics_disabled_is_404() {
    let (_, router) = app();
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
