//! Integration tests for the agent API endpoints

use activity_sync::api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use sync_lib::{
    health::{components, HealthRegistry},
    observability::BatchOutcome,
    SyncMetrics,
};
use tower::ServiceExt;

async fn setup_test_app() -> (Router, HealthRegistry) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::LOCAL_SOURCE).await;
    health_registry.register(components::CHECKPOINT_STORE).await;
    health_registry.register(components::REMOTE).await;

    let router = create_router(Arc::new(AppState::new(health_registry.clone())));
    (router, health_registry)
}

async fn get(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_healthz_returns_200_when_healthy() {
    let (app, _) = setup_test_app().await;

    let (status, json) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["components"]["local_source"].is_object());
    assert!(json["components"]["checkpoint_store"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_200_when_remote_rejects() {
    let (app, registry) = setup_test_app().await;
    registry
        .set_degraded(components::REMOTE, "batch for aw-watcher-window rejected with 400")
        .await;

    let (status, json) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_source_down() {
    let (app, registry) = setup_test_app().await;
    registry
        .set_unhealthy(components::LOCAL_SOURCE, "connection refused")
        .await;

    let (status, json) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(
        json["components"]["local_source"]["message"],
        "connection refused"
    );
}

#[tokio::test]
async fn test_readyz_before_first_iteration() {
    let (app, _) = setup_test_app().await;

    let (status, json) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);
    assert!(json["reason"].is_string());
}

#[tokio::test]
async fn test_readyz_after_first_iteration() {
    let (app, registry) = setup_test_app().await;
    registry.set_ready(true).await;

    let (status, json) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
}

#[tokio::test]
async fn test_readyz_when_checkpoint_store_fails() {
    let (app, registry) = setup_test_app().await;
    registry.set_ready(true).await;
    registry
        .set_unhealthy(components::CHECKPOINT_STORE, "database is locked")
        .await;

    let (status, _) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_sync_metrics() {
    let (app, _) = setup_test_app().await;
    SyncMetrics::new().record_batch(BatchOutcome::Success, 4);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("activity_sync_events_forwarded_total"));
    assert!(text.contains("activity_sync_batches_total{outcome=\"success\"}"));
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _) = setup_test_app().await;

    let (status, _) = get(app, "/nonexistent").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
