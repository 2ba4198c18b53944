use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::client::StatsClient;
use crate::models::{
    now_utc, parse_timestamp, EventDto, EventFilter, EventSort, NewEventRequest,
};
use crate::storage::{trait_def::to_unix, EventStore, NewEvent, StorageError};

pub const MIN_TEXT_LEN: usize = 3;
pub const MAX_TEXT_LEN: usize = 1000;
pub const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("{0}")]
    Validation(String),
    #[error("Event with id={0} was not found")]
    NotFound(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
    stats: Arc<StatsClient>,
}

pub fn validate_filter(filter: &EventFilter) -> Result<(), EventError> {
    if let Some(text) = filter.text.as_deref() {
        let len = text.trim().chars().count();
        if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&len) {
            return Err(EventError::Validation(format!(
                "text must be between {MIN_TEXT_LEN} and {MAX_TEXT_LEN} characters"
            )));
        }
    }
    if filter.from < 0 {
        return Err(EventError::Validation("from must not be negative".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&filter.size) {
        return Err(EventError::Validation(format!(
            "size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>, stats: Arc<StatsClient>) -> Self {
        Self { store, stats }
    }

    pub fn stats(&self) -> &StatsClient {
        &self.stats
    }

    pub async fn find_published(&self, id: i64) -> Result<EventDto, EventError> {
        let event = self
            .store
            .get_published_event(id)
            .await?
            .ok_or(EventError::NotFound(id))?;

        let views = self.stats.get_views_for_entities(&[id]).await;
        Ok(EventDto::from_event(event, views.get(&id).copied().unwrap_or(0)))
    }

    /// One page of published events with their view counts
    pub async fn find_published_list(&self, filter: &EventFilter) -> Result<Vec<EventDto>, EventError> {
        validate_filter(filter)?;

        let events = self.store.list_published_events(filter).await?;
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        let views = self.stats.get_views_for_entities(&ids).await;

        let mut page: Vec<EventDto> = events
            .into_iter()
            .map(|event| {
                let count = views.get(&event.id).copied().unwrap_or(0);
                EventDto::from_event(event, count)
            })
            .collect();

        if filter.sort == EventSort::Views {
            page.sort_by(|a, b| b.views.cmp(&a.views));
        }

        debug!(count = page.len(), sort = ?filter.sort, "listed published events");
        Ok(page)
    }

    pub async fn create(&self, request: NewEventRequest) -> Result<EventDto, EventError> {
        let title = request.title.trim();
        let annotation = request.annotation.trim();
        if title.is_empty() || annotation.is_empty() {
            return Err(EventError::Validation(
                "title and annotation must not be blank".to_string(),
            ));
        }
        let event_date = parse_timestamp(&request.event_date).map_err(|_| {
            EventError::Validation(format!(
                "eventDate must match 'yyyy-MM-dd HH:mm:ss', got '{}'",
                request.event_date
            ))
        })?;

        let event = self
            .store
            .create_event(&NewEvent {
                title: title.to_string(),
                annotation: annotation.to_string(),
                description: request.description,
                paid: request.paid,
                event_date: to_unix(&event_date),
                created_at: to_unix(&now_utc()),
            })
            .await?;

        info!(id = event.id, title = %event.title, "event created");
        Ok(EventDto::from_event(event, 0))
    }

    pub async fn publish(&self, id: i64) -> Result<EventDto, EventError> {
        let event = self
            .store
            .publish_event(id, to_unix(&now_utc()))
            .await?
            .ok_or(EventError::NotFound(id))?;

        info!(id, "event published");
        Ok(EventDto::from_event(event, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_bounds() {
        assert!(validate_filter(&EventFilter::default()).is_ok());

        let short_text = EventFilter {
            text: Some("ab".to_string()),
            ..EventFilter::default()
        };
        assert!(matches!(validate_filter(&short_text), Err(EventError::Validation(_))));

        let negative_from = EventFilter {
            from: -1,
            ..EventFilter::default()
        };
        assert!(validate_filter(&negative_from).is_err());

        let zero_size = EventFilter {
            size: 0,
            ..EventFilter::default()
        };
        assert!(validate_filter(&zero_size).is_err());

        let huge_size = EventFilter {
            size: 1001,
            ..EventFilter::default()
        };
        assert!(validate_filter(&huge_size).is_err());
    }
}
