use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::client_ip::extract_client_ip;
use super::service::{EventError, EventService};
use crate::api::{bad_request, error_response, ApiError};
use crate::client::HitDispatcher;
use crate::config::ClientIpConfig;
use crate::models::{now_utc, EventDto, EventFilter, HitRecord, NewEventRequest};

pub struct EventsState {
    pub service: EventService,
    pub dispatcher: HitDispatcher,
    pub client_ip: ClientIpConfig,
    /// `app` value of emitted hits
    pub app_name: String,
    pub stats_service_name: String,
}

impl EventsState {
    fn record_hit(&self, uri: String, headers: &HeaderMap, peer: SocketAddr) {
        let ip = extract_client_ip(headers, peer.ip(), &self.client_ip);
        tracing::debug!(uri = %uri, ip = %ip, "dispatching hit");
        self.dispatcher
            .dispatch(HitRecord::new(&self.app_name, uri, ip.to_string(), now_utc()));
    }
}

fn event_error(e: EventError) -> ApiError {
    match e {
        EventError::Validation(message) => bad_request(message),
        EventError::NotFound(_) => error_response(
            StatusCode::NOT_FOUND,
            "The required object was not found.",
            e.to_string(),
        ),
        EventError::Storage(e) => {
            tracing::error!("event storage failure: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred",
                e.to_string(),
            )
        }
    }
}

/// Published events page; the request itself counts as a hit when the page is not empty
pub async fn list_events(
    State(state): State<Arc<EventsState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
    filter: Result<Query<EventFilter>, QueryRejection>,
) -> Result<Json<Vec<EventDto>>, ApiError> {
    let Query(filter) = filter.map_err(|rejection| bad_request(rejection.body_text()))?;
    tracing::info!(text = ?filter.text, paid = ?filter.paid, from = filter.from, size = filter.size, "public events request");

    let events = state
        .service
        .find_published_list(&filter)
        .await
        .map_err(event_error)?;

    if !events.is_empty() {
        let hit_uri = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        state.record_hit(hit_uri, &headers, peer);
    }

    Ok(Json(events))
}

pub async fn get_event(
    State(state): State<Arc<EventsState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<EventDto>, ApiError> {
    if id < 1 {
        return Err(bad_request(format!("Event id must be positive, got {id}")));
    }

    let event = state.service.find_published(id).await.map_err(event_error)?;
    state.record_hit(format!("/events/{id}"), &headers, peer);

    Ok(Json(event))
}

pub async fn create_event(
    State(state): State<Arc<EventsState>>,
    payload: Result<Json<NewEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EventDto>), ApiError> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;

    let event = state.service.create(request).await.map_err(event_error)?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn publish_event(
    State(state): State<Arc<EventsState>>,
    Path(id): Path<i64>,
) -> Result<Json<EventDto>, ApiError> {
    let event = state.service.publish(id).await.map_err(event_error)?;
    Ok(Json(event))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub service: String,
    pub status: &'static str,
}

/// Reachability of the stats service
pub async fn stats_health(
    State(state): State<Arc<EventsState>>,
) -> (StatusCode, Json<DependencyHealth>) {
    let (code, status) = if state.service.stats().ping().await {
        (StatusCode::OK, "available")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        code,
        Json(DependencyHealth {
            service: state.stats_service_name.clone(),
            status,
        }),
    )
}
