use crate::models::{StatsQuery, ViewStat};
use crate::storage::{HitStore, InsertOutcome, StorageResult, StoredHit};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hit store wrapper that caches aggregate query results.
///
/// Entries are keyed by the full query (start, end, uris, unique) and expire
/// after a short TTL. Every write bumps a generation counter and clears the
/// whole cache. A query result is only cached if no write completed while it
/// was being computed, so a query issued after a write never sees results
/// computed before it.
pub struct CachedHitStore {
    inner: Arc<dyn HitStore>,
    stats_cache: Cache<StatsQuery, Arc<Vec<ViewStat>>>,
    generation: AtomicU64,
}

impl CachedHitStore {
    pub fn new(inner: Arc<dyn HitStore>, max_entries: u64, ttl_secs: u64) -> Self {
        let stats_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            stats_cache,
            generation: AtomicU64::new(0),
        }
    }

    fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stats_cache.invalidate_all();
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    async fn cached_entries(&self) -> u64 {
        self.stats_cache.run_pending_tasks().await;
        self.stats_cache.entry_count()
    }
}

#[async_trait]
impl HitStore for CachedHitStore {
    async fn insert_hit(&self, hit: &StoredHit) -> StorageResult<InsertOutcome> {
        let outcome = self.inner.insert_hit(hit).await?;
        self.invalidate_all();
        Ok(outcome)
    }

    async fn get_stats(&self, query: &StatsQuery) -> StorageResult<Vec<ViewStat>> {
        if let Some(cached) = self.stats_cache.get(query).await {
            tracing::trace!(start = %query.start, end = %query.end, "stats cache hit");
            return Ok(cached.as_ref().clone());
        }

        let generation = self.current_generation();
        let stats = self.inner.get_stats(query).await?;
        if self.current_generation() != generation {
            tracing::trace!("hits changed during stats query, result not cached");
            return Ok(stats);
        }

        self.stats_cache
            .insert(query.clone(), Arc::new(stats.clone()))
            .await;
        // A write that landed between the check and the insert
        if self.current_generation() != generation {
            self.stats_cache.invalidate(query).await;
        }

        Ok(stats)
    }

    async fn count_hits(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        unique: bool,
    ) -> StorageResult<i64> {
        self.inner.count_hits(start, end, unique).await
    }

    async fn delete_before(&self, cutoff: NaiveDateTime) -> StorageResult<u64> {
        let deleted = self.inner.delete_before(cutoff).await?;
        self.invalidate_all();
        Ok(deleted)
    }
}
