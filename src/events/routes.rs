use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_event, get_event, health_check, list_events, publish_event, stats_health, EventsState,
};

/// Routes of the event service. Must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_events_router(state: EventsState) -> Router {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
        .route("/admin/events", post(create_event))
        .route("/admin/events/{id}/publish", patch(publish_event))
        .route("/health", get(health_check))
        .route("/health/stats", get(stats_health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
