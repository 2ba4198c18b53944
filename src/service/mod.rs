//! Stats service business logic: hit ingestion, aggregate queries and
//! retention cleanup on top of a [`HitStore`].

pub mod validation;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::StatsConfig;
use crate::models::{now_utc, HitRecord, StatsQuery, ViewStat};
use crate::storage::{HitStore, InsertOutcome, StorageError};

pub use validation::{validate_hit, validate_range, validate_uris};

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-item tallies of a batch submission
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub stored: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

#[derive(Clone)]
pub struct HitService {
    store: Arc<dyn HitStore>,
    limits: StatsConfig,
}

impl HitService {
    pub fn new(store: Arc<dyn HitStore>, limits: StatsConfig) -> Self {
        Self { store, limits }
    }

    pub async fn create_hit(&self, record: &HitRecord) -> Result<InsertOutcome, StatsError> {
        let hit = validate_hit(record)?;
        let outcome = self.store.insert_hit(&hit).await?;

        match outcome {
            InsertOutcome::Inserted => {
                debug!(app = %hit.app, uri = %hit.uri, ip = %hit.ip, "hit saved");
            }
            InsertOutcome::Duplicate => {
                warn!(app = %hit.app, uri = %hit.uri, ip = %hit.ip, timestamp = %hit.timestamp, "duplicate hit ignored");
            }
        }

        Ok(outcome)
    }

    /// Store each record independently. Failures are logged and counted,
    /// never surfaced, so one bad record cannot sink the rest of the batch.
    pub async fn create_hits(&self, records: &[HitRecord]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for record in records {
            match self.create_hit(record).await {
                Ok(InsertOutcome::Inserted) => outcome.stored += 1,
                Ok(InsertOutcome::Duplicate) => outcome.duplicates += 1,
                Err(e) => {
                    warn!(uri = %record.uri, error = %e, "failed to save hit in batch");
                    outcome.rejected += 1;
                }
            }
        }

        info!(
            stored = outcome.stored,
            duplicates = outcome.duplicates,
            rejected = outcome.rejected,
            "batch processed"
        );
        outcome
    }

    /// Store a hit on a background task; the caller does not wait for the result
    pub fn create_hit_async(&self, record: HitRecord) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.create_hit(&record).await {
                tracing::error!(uri = %record.uri, error = %e, "failed to create hit asynchronously");
            }
        });
    }

    pub async fn get_stats(&self, query: &StatsQuery) -> Result<Vec<ViewStat>, StatsError> {
        debug!(
            start = %query.start,
            end = %query.end,
            uris = ?query.uris,
            unique = query.unique,
            "getting stats"
        );

        validate_range(query.start, query.end, now_utc(), self.limits.max_range_days)?;
        validate_uris(query.uris.as_deref(), self.limits.max_uris)?;

        let stats = self.store.get_stats(query).await?;
        debug!(count = stats.len(), "returning stats records");
        Ok(stats)
    }

    pub async fn total_hits(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64, StatsError> {
        validate_range(start, end, now_utc(), self.limits.max_range_days)?;
        Ok(self.store.count_hits(start, end, false).await?)
    }

    pub async fn unique_hits(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<i64, StatsError> {
        validate_range(start, end, now_utc(), self.limits.max_range_days)?;
        Ok(self.store.count_hits(start, end, true).await?)
    }

    /// Delete hits older than `days_to_keep` days. Returns the number removed.
    pub async fn cleanup(&self, days_to_keep: i64) -> Result<u64, StatsError> {
        if days_to_keep < 1 {
            return Err(StatsError::Validation(
                "Days to keep must be at least 1".to_string(),
            ));
        }

        let Some(cutoff) =
            Duration::try_days(days_to_keep).and_then(|keep| now_utc().checked_sub_signed(keep))
        else {
            debug!(days_to_keep, "retention window reaches past the earliest timestamp");
            return Ok(0);
        };
        let deleted = self.store.delete_before(cutoff).await?;

        info!(deleted, %cutoff, "cleaned up old hits");
        Ok(deleted)
    }
}
