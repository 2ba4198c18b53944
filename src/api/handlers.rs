use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, RawQuery, State,
    },
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{format_timestamp, now_utc, parse_timestamp, HitRecord, StatsQuery, ViewStat};
use crate::service::{HitService, StatsError};

pub struct AppState {
    pub service: HitService,
}

/// Error body shared by every service
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub reason: String,
    pub status: String,
    pub timestamp: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, reason: &str, message: impl Into<String>) -> ApiError {
    let status_name = status
        .canonical_reason()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
        .replace(' ', "_");

    (
        status,
        Json(ErrorResponse {
            message: message.into(),
            reason: reason.to_string(),
            status: status_name,
            timestamp: format_timestamp(&now_utc()),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(
        StatusCode::BAD_REQUEST,
        "Incorrectly made request.",
        message,
    )
}

fn stats_error(e: StatsError) -> ApiError {
    match e {
        StatsError::Validation(message) => bad_request(message),
        StatsError::Storage(e) => {
            tracing::error!("stats storage failure: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred",
                e.to_string(),
            )
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    #[serde(rename = "daysToKeep", default = "default_days_to_keep")]
    pub days_to_keep: i64,
}

fn default_days_to_keep() -> i64 {
    365
}

fn required_timestamp(value: Option<&str>, name: &str) -> Result<NaiveDateTime, ApiError> {
    let raw = value.ok_or_else(|| {
        bad_request(format!("Required request parameter '{name}' is not present"))
    })?;
    parse_timestamp(raw).map_err(|_| {
        bad_request(format!(
            "Parameter '{name}' must match 'yyyy-MM-dd HH:mm:ss', got '{raw}'"
        ))
    })
}

/// Parse `start`, `end`, repeated `uris` and `unique` from a raw query string
pub fn parse_stats_query(raw: &str) -> Result<StatsQuery, ApiError> {
    let mut start = None;
    let mut end = None;
    let mut uris: Option<Vec<String>> = None;
    let mut unique = false;

    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        match key.as_ref() {
            "start" => start = Some(value.into_owned()),
            "end" => end = Some(value.into_owned()),
            "uris" => uris.get_or_insert_with(Vec::new).push(value.into_owned()),
            "unique" => {
                unique = value.parse::<bool>().map_err(|_| {
                    bad_request(format!("Parameter 'unique' must be a boolean, got '{value}'"))
                })?;
            }
            _ => {}
        }
    }

    let start = required_timestamp(start.as_deref(), "start")?;
    let end = required_timestamp(end.as_deref(), "end")?;

    Ok(StatsQuery {
        start,
        end,
        uris,
        unique,
    })
}

/// Record a single hit
pub async fn create_hit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HitRecord>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let record = json_body(payload)?;
    tracing::info!(app = %record.app, uri = %record.uri, ip = %record.ip, "received hit");

    state.service.create_hit(&record).await.map_err(stats_error)?;
    Ok(StatusCode::CREATED)
}

/// Accept a hit and store it in the background
pub async fn create_hit_async(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HitRecord>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let record = json_body(payload)?;
    tracing::debug!(uri = %record.uri, "received async hit");

    state.service.create_hit_async(record);
    Ok(StatusCode::ACCEPTED)
}

/// Record a batch of hits; invalid items are skipped
pub async fn create_hits_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<HitRecord>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let records = json_body(payload)?;
    tracing::info!("received batch of {} hits", records.len());

    state.service.create_hits(&records).await;
    Ok(StatusCode::CREATED)
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Vec<ViewStat>>, ApiError> {
    let query = parse_stats_query(raw.as_deref().unwrap_or_default())?;
    tracing::info!(
        start = %query.start,
        end = %query.end,
        uris = ?query.uris,
        unique = query.unique,
        "stats request"
    );

    let stats = state.service.get_stats(&query).await.map_err(stats_error)?;
    Ok(Json(stats))
}

pub async fn get_total_hits(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<i64>, ApiError> {
    let params = query_params(params)?;
    let start = required_timestamp(params.start.as_deref(), "start")?;
    let end = required_timestamp(params.end.as_deref(), "end")?;

    let total = state
        .service
        .total_hits(start, end)
        .await
        .map_err(stats_error)?;
    Ok(Json(total))
}

pub async fn get_unique_hits(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<i64>, ApiError> {
    let params = query_params(params)?;
    let start = required_timestamp(params.start.as_deref(), "start")?;
    let end = required_timestamp(params.end.as_deref(), "end")?;

    let unique = state
        .service
        .unique_hits(start, end)
        .await
        .map_err(stats_error)?;
    Ok(Json(unique))
}

pub async fn cleanup_old_hits(
    State(state): State<Arc<AppState>>,
    params: Result<Query<CleanupParams>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let params = query_params(params)?;
    tracing::info!(
        "cleanup request for hits older than {} days",
        params.days_to_keep
    );

    state
        .service
        .cleanup(params.days_to_keep)
        .await
        .map_err(stats_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn info() -> String {
    format!("hitcount stats service v{}", env!("CARGO_PKG_VERSION"))
}
