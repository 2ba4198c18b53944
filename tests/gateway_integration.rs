//! Gateway forwarding against a live stats service and a dead event service

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use hitcount::api::{create_stats_router, ErrorResponse};
use hitcount::config::{GatewayConfig, StatsConfig};
use hitcount::gateway::{create_gateway_router, GatewayState};
use hitcount::models::{now_utc, HitRecord};
use hitcount::service::HitService;
use hitcount::storage::SqliteStorage;
use std::sync::Arc;
use tower::ServiceExt;

async fn setup() -> (Router, HitService) {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let hits = HitService::new(Arc::new(storage), StatsConfig::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats_router = create_stats_router(hits.clone());
    tokio::spawn(async move {
        axum::serve(listener, stats_router).await.unwrap();
    });

    let gateway = create_gateway_router(
        GatewayState::new(&GatewayConfig {
            stats_url: format!("http://{addr}"),
            events_url: "http://127.0.0.1:1".to_string(),
        })
        .unwrap(),
    );
    (gateway, hits)
}

#[tokio::test]
async fn test_hit_is_forwarded_to_stats_service() {
    let (gateway, hits) = setup().await;
    let now = now_utc();
    let record = HitRecord::new("event-service", "/events/1", "10.0.0.1", now);

    let response = gateway
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hit")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&record).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let total = hits
        .total_hits(now - chrono::Duration::minutes(1), now)
        .await
        .unwrap();
    assert_eq!(total, 1);

    let response = gateway
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        response.status(),
        StatusCode::BAD_REQUEST,
        "upstream status is passed through"
    );
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let (gateway, _) = setup().await;

    let response = gateway
        .oneshot(Request::builder().uri("/users/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dead_upstream_is_bad_gateway() {
    let (gateway, _) = setup().await;

    let response = gateway
        .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.status, "BAD_GATEWAY");
}

#[tokio::test]
async fn test_cors_preflight_is_answered() {
    let (gateway, _) = setup().await;

    let response = gateway
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/events")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
