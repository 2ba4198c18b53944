use chrono::DateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::hit::TIMESTAMP_FORMAT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    Pending,
    Published,
    Canceled,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Pending => "PENDING",
            EventState::Published => "PUBLISHED",
            EventState::Canceled => "CANCELED",
        }
    }
}

impl TryFrom<String> for EventState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "PENDING" => Ok(EventState::Pending),
            "PUBLISHED" => Ok(EventState::Published),
            "CANCELED" => Ok(EventState::Canceled),
            other => Err(format!("unknown event state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub annotation: String,
    pub description: Option<String>,
    pub paid: bool,
    pub event_date: i64,
    pub created_at: i64,
    pub published_at: Option<i64>,
    #[sqlx(try_from = "String")]
    pub state: EventState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEventRequest {
    pub title: String,
    pub annotation: String,
    pub description: Option<String>,
    #[serde(default)]
    pub paid: bool,
    /// `yyyy-MM-dd HH:mm:ss`
    pub event_date: String,
}

/// Public representation of an event, including its view count
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub id: i64,
    pub title: String,
    pub annotation: String,
    pub description: Option<String>,
    pub paid: bool,
    pub event_date: String,
    pub created_on: String,
    pub published_on: Option<String>,
    pub state: EventState,
    pub views: i64,
}

fn format_unix(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc().format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

impl EventDto {
    pub fn from_event(event: Event, views: i64) -> Self {
        Self {
            id: event.id,
            title: event.title,
            annotation: event.annotation,
            description: event.description,
            paid: event.paid,
            event_date: format_unix(event.event_date),
            created_on: format_unix(event.created_at),
            published_on: event.published_at.map(format_unix),
            state: event.state,
            views,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSort {
    #[default]
    EventDate,
    Views,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFilter {
    pub text: Option<String>,
    pub paid: Option<bool>,
    #[serde(default)]
    pub sort: EventSort,
    #[serde(default)]
    pub from: i64,
    #[serde(default = "EventFilter::default_size")]
    pub size: i64,
}

impl EventFilter {
    const fn default_size() -> i64 {
        10
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            text: None,
            paid: None,
            sort: EventSort::default(),
            from: 0,
            size: Self::default_size(),
        }
    }
}
