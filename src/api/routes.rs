use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::HitService;

use super::handlers::{
    cleanup_old_hits, create_hit, create_hit_async, create_hits_batch, get_stats,
    get_total_hits, get_unique_hits, health_check, info, AppState,
};

pub fn create_stats_router(service: HitService) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/hit", post(create_hit))
        .route("/hit/async", post(create_hit_async))
        .route("/hit/batch", post(create_hits_batch))
        .route("/stats", get(get_stats))
        .route("/stats/total", get(get_total_hits))
        .route("/stats/unique", get(get_unique_hits))
        .route("/stats/cleanup", delete(cleanup_old_hits))
        .route("/health", get(health_check))
        .route("/info", get(info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
