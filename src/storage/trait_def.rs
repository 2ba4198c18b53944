use crate::models::{Event, EventFilter, StatsQuery, ViewStat};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of inserting a hit. Exact duplicates of an already stored
/// (app, uri, ip, timestamp) tuple are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// A validated, trimmed hit ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHit {
    pub app: String,
    pub uri: String,
    pub ip: String,
    pub timestamp: NaiveDateTime,
}

#[async_trait]
pub trait HitStore: Send + Sync {
    /// Insert a hit, ignoring exact duplicates
    async fn insert_hit(&self, hit: &StoredHit) -> StorageResult<InsertOutcome>;

    /// Hits grouped by (app, uri) within `[start, end]`, most viewed first.
    /// Counts distinct IPs when `query.unique` is set.
    async fn get_stats(&self, query: &StatsQuery) -> StorageResult<Vec<ViewStat>>;

    /// Number of hits (or distinct IPs when `unique`) within `[start, end]`
    async fn count_hits(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        unique: bool,
    ) -> StorageResult<i64>;

    /// Delete every hit strictly older than `cutoff`, returning the number removed
    async fn delete_before(&self, cutoff: NaiveDateTime) -> StorageResult<u64>;
}

/// A validated event ready to be persisted in the `PENDING` state
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub annotation: String,
    pub description: Option<String>,
    pub paid: bool,
    pub event_date: i64,
    pub created_at: i64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, event: &NewEvent) -> StorageResult<Event>;

    /// Move an event to `PUBLISHED`. Returns `None` when the id is unknown.
    async fn publish_event(&self, id: i64, published_at: i64) -> StorageResult<Option<Event>>;

    async fn get_published_event(&self, id: i64) -> StorageResult<Option<Event>>;

    /// Published events matching the filter, ordered by event date
    async fn list_published_events(&self, filter: &EventFilter) -> StorageResult<Vec<Event>>;
}

pub(crate) fn to_unix(value: &NaiveDateTime) -> i64 {
    value.and_utc().timestamp()
}

/// `%text%` pattern for case-insensitive substring search
pub(crate) fn like_pattern(text: &str) -> String {
    format!("%{}%", text.trim().to_lowercase())
}
