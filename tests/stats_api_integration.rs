//! End-to-end tests of the stats service HTTP API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Duration;
use hitcount::api::{create_stats_router, ErrorResponse};
use hitcount::config::StatsConfig;
use hitcount::models::{format_timestamp, now_utc, HitRecord, ViewStat};
use hitcount::service::HitService;
use hitcount::storage::{CachedHitStore, SqliteStorage};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

async fn create_test_service() -> HitService {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let cached = CachedHitStore::new(Arc::new(storage), 100, 60);
    HitService::new(Arc::new(cached), StatsConfig::default())
}

async fn create_test_app() -> Router {
    create_stats_router(create_test_service().await)
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn range_query() -> String {
    let now = now_utc();
    format!(
        "start={}&end={}",
        encode(&format_timestamp(&(now - Duration::hours(1)))),
        encode(&format_timestamp(&(now + Duration::minutes(1))))
    )
}

fn hit(uri: &str, ip: &str) -> HitRecord {
    HitRecord::new("event-service", uri, ip, now_utc())
}

#[tokio::test]
async fn test_create_hit_returns_created() {
    let app = create_test_app().await;

    let response = app
        .oneshot(post_json("/hit", &serde_json::json!(hit("/events/1", "10.0.0.1"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_invalid_hit_returns_error_body() {
    let app = create_test_app().await;

    let response = app
        .oneshot(post_json(
            "/hit",
            &serde_json::json!({"app": "event-service", "uri": "/events/1", "ip": "10.0.0.1", "timestamp": "2024-01-01T00:00:00"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.status, "BAD_REQUEST");
    assert!(body.message.contains("timestamp"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/hit")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_hits_count_once() {
    let app = create_test_app().await;
    let record = hit("/events/1", "10.0.0.1");

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/hit", &serde_json::json!(record)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(get(&format!("/stats/total?{}", range_query())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let total: i64 = read_json(response).await;
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_batch_then_stats_with_uri_filter() {
    let app = create_test_app().await;
    let now = now_utc();
    let batch = vec![
        HitRecord::new("event-service", "/events/1", "10.0.0.1", now),
        HitRecord::new("event-service", "/events/1", "10.0.0.1", now - Duration::seconds(1)),
        HitRecord::new("event-service", "/events/1", "10.0.0.2", now),
        HitRecord::new("event-service", "/events/2", "10.0.0.3", now),
        // invalid item is skipped without failing the batch
        HitRecord::default(),
    ];

    let response = app
        .clone()
        .oneshot(post_json("/hit/batch", &serde_json::json!(batch)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/stats?{}&uris={}&uris={}",
            range_query(),
            encode("/events/1"),
            encode("/events/3")
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats: Vec<ViewStat> = read_json(response).await;
    assert_eq!(
        stats,
        vec![ViewStat {
            app: "event-service".to_string(),
            uri: "/events/1".to_string(),
            hits: 3
        }]
    );

    let response = app
        .clone()
        .oneshot(get(&format!("/stats?{}&unique=true", range_query())))
        .await
        .unwrap();
    let stats: Vec<ViewStat> = read_json(response).await;
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].uri, "/events/1");
    assert_eq!(stats[0].hits, 2);
    assert_eq!(stats[1].hits, 1);

    let response = app
        .oneshot(get(&format!("/stats/unique?{}", range_query())))
        .await
        .unwrap();
    let unique: i64 = read_json(response).await;
    assert_eq!(unique, 3);
}

#[tokio::test]
async fn test_stats_written_after_cached_read_are_visible() {
    let app = create_test_app().await;
    let stats_uri = format!("/stats?{}", range_query());

    let response = app.clone().oneshot(get(&stats_uri)).await.unwrap();
    let before: Vec<ViewStat> = read_json(response).await;
    assert!(before.is_empty());

    app.clone()
        .oneshot(post_json("/hit", &serde_json::json!(hit("/events/9", "10.0.0.1"))))
        .await
        .unwrap();

    let response = app.oneshot(get(&stats_uri)).await.unwrap();
    let after: Vec<ViewStat> = read_json(response).await;
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn test_stats_validation_errors() {
    let app = create_test_app().await;
    let now = now_utc();

    let inverted = format!(
        "/stats?start={}&end={}",
        encode(&format_timestamp(&now)),
        encode(&format_timestamp(&(now - Duration::days(1))))
    );
    let response = app.clone().oneshot(get(&inverted)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let too_long = format!(
        "/stats?start={}&end={}",
        encode(&format_timestamp(&(now - Duration::days(400)))),
        encode(&format_timestamp(&now))
    );
    let response = app.clone().oneshot(get(&too_long)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/stats?start=2024-01-01+00:00:00"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert!(body.message.contains("end"));
}

#[tokio::test]
async fn test_async_hit_is_accepted_and_stored() {
    let app = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/hit/async", &serde_json::json!(hit("/events/4", "10.0.0.4"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let mut total = 0i64;
    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(get(&format!("/stats/total?{}", range_query())))
            .await
            .unwrap();
        total = read_json(response).await;
        if total == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_cleanup_endpoint() {
    let app = create_test_app().await;
    let old = HitRecord::new(
        "event-service",
        "/events/1",
        "10.0.0.1",
        now_utc() - Duration::days(40),
    );
    app.clone()
        .oneshot(post_json("/hit", &serde_json::json!(old)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/stats/cleanup?daysToKeep=30")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/stats/cleanup?daysToKeep=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cleanup_with_retention_beyond_calendar() {
    let app = create_test_app().await;
    let recent = HitRecord::new("event-service", "/events/1", "10.0.0.1", now_utc());
    app.clone()
        .oneshot(post_json("/hit", &serde_json::json!(recent)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/stats/cleanup?daysToKeep=100000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get(&format!("/stats/total?{}", range_query())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let total: i64 = read_json(response).await;
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_malformed_query_parameters_get_error_body() {
    let app = create_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/stats/cleanup?daysToKeep=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.status, "BAD_REQUEST");

    let response = app
        .oneshot(get("/stats/unique?start=a&start=b"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.reason, "Incorrectly made request.");
}

#[tokio::test]
async fn test_health_and_info() {
    let app = create_test_app().await;

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");

    let response = app.oneshot(get("/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
