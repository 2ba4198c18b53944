//! HTTP client for the stats service used by applications that report hits
//! and display view counts.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use reqwest::{RequestBuilder, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::discovery::ServiceResolver;
use super::retry::RetryPolicy;
use super::ClientError;
use crate::config::StatsClientConfig;
use crate::models::{format_timestamp, now_utc, HitRecord, StatsQuery, ViewStat};

pub const DEFAULT_URI_PREFIX: &str = "/events/";

/// Tallies of one `report_hits` call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    /// Batch submissions attempted
    pub batches: usize,
    /// Records delivered through a successful batch
    pub batched: usize,
    pub fallback_ok: usize,
    pub fallback_failed: usize,
}

impl ReportSummary {
    pub fn delivered(&self) -> usize {
        self.batched + self.fallback_ok
    }
}

pub struct StatsClient {
    http: reqwest::Client,
    resolver: Arc<dyn ServiceResolver>,
    service_name: String,
    retry: RetryPolicy,
    max_batch_size: usize,
    max_uris_per_query: usize,
    max_range_days: i64,
    uri_prefix: String,
}

impl StatsClient {
    pub fn new(
        config: &StatsClientConfig,
        resolver: Arc<dyn ServiceResolver>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            resolver,
            service_name: config.service_name.clone(),
            retry: RetryPolicy::new(
                config.retry_attempts,
                Duration::from_millis(config.retry_delay_ms),
                config.retry_backoff,
            ),
            max_batch_size: config.max_batch_size.max(1),
            max_uris_per_query: config.max_uris_per_query.max(1),
            max_range_days: config.max_range_days,
            uri_prefix: DEFAULT_URI_PREFIX.to_string(),
        })
    }

    /// Use another URI prefix for entity view lookups
    pub fn with_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = prefix.into();
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let instance = self.resolver.resolve(&self.service_name).await?;
        Ok(Url::parse(&instance.base_url())?.join(path)?)
    }

    /// Send and turn non-2xx answers into errors. A connect failure drops the
    /// cached instance so the next attempt resolves again.
    async fn send_checked(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(ClientError::Status(response.status())),
            Err(e) => {
                if e.is_connect() {
                    self.resolver.invalidate(&self.service_name).await;
                }
                Err(e.into())
            }
        }
    }

    async fn post_hit_once(&self, hit: &HitRecord) -> Result<(), ClientError> {
        let url = self.endpoint("/hit").await?;
        self.send_checked(self.http.post(url).json(hit)).await?;
        Ok(())
    }

    async fn post_batch_once(&self, hits: &[HitRecord]) -> Result<(), ClientError> {
        let url = self.endpoint("/hit/batch").await?;
        self.send_checked(self.http.post(url).json(hits)).await?;
        Ok(())
    }

    async fn fetch_stats_once(
        &self,
        query: &StatsQuery,
        uris: Option<&[String]>,
    ) -> Result<Vec<ViewStat>, ClientError> {
        let mut url = self.endpoint("/stats").await?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("start", &format_timestamp(&query.start))
                .append_pair("end", &format_timestamp(&query.end));
            for uri in uris.unwrap_or_default() {
                pairs.append_pair("uris", uri);
            }
            pairs.append_pair("unique", if query.unique { "true" } else { "false" });
        }

        let response = self.send_checked(self.http.get(url)).await?;
        Ok(response.json::<Vec<ViewStat>>().await?)
    }

    async fn health_once(&self) -> Result<(), ClientError> {
        let url = self.endpoint("/health").await?;
        self.send_checked(self.http.get(url)).await?;
        Ok(())
    }

    /// Deliver one hit with retry. Failures are logged, never returned.
    pub async fn report_hit(&self, hit: &HitRecord) -> bool {
        if hit.app.is_empty() || hit.uri.is_empty() || hit.ip.is_empty() || hit.timestamp.is_empty()
        {
            warn!(?hit, "refusing to report hit with empty fields");
            return false;
        }

        match self
            .retry
            .run("report_hit", move |_| self.post_hit_once(hit))
            .await
        {
            Ok(()) => {
                debug!(app = %hit.app, uri = %hit.uri, "hit reported");
                true
            }
            Err(e) => {
                warn!(app = %hit.app, uri = %hit.uri, error = %e, "failed to report hit");
                false
            }
        }
    }

    /// Deliver hits in batches of `max_batch_size`, falling back to single
    /// reports for every record of a batch that could not be submitted.
    pub async fn report_hits(&self, hits: &[HitRecord]) -> ReportSummary {
        let mut summary = ReportSummary::default();
        if hits.is_empty() {
            return summary;
        }

        for chunk in hits.chunks(self.max_batch_size) {
            summary.batches += 1;
            match self.post_batch_once(chunk).await {
                Ok(()) => summary.batched += chunk.len(),
                Err(e) => {
                    warn!(
                        size = chunk.len(),
                        error = %e,
                        "batch submission failed, reporting hits one by one"
                    );
                    for hit in chunk {
                        if self.report_hit(hit).await {
                            summary.fallback_ok += 1;
                        } else {
                            summary.fallback_failed += 1;
                        }
                    }
                }
            }
        }

        info!(
            total = hits.len(),
            batches = summary.batches,
            batched = summary.batched,
            fallback_ok = summary.fallback_ok,
            fallback_failed = summary.fallback_failed,
            "hit report finished"
        );
        summary
    }

    /// Aggregate stats. Large URI lists are split into sub-queries of
    /// `max_uris_per_query`; a sub-query that still fails after retries
    /// contributes nothing to the result.
    pub async fn get_stats(&self, query: &StatsQuery) -> Result<Vec<ViewStat>, ClientError> {
        if query.start > query.end {
            return Err(ClientError::Validation(format!(
                "start {} is after end {}",
                format_timestamp(&query.start),
                format_timestamp(&query.end)
            )));
        }
        let max_span = ChronoDuration::try_days(self.max_range_days);
        if max_span.is_some_and(|max_span| query.end - query.start > max_span) {
            return Err(ClientError::Validation(format!(
                "date range exceeds {} days",
                self.max_range_days
            )));
        }
        if query.start > now_utc() {
            warn!(start = %query.start, "stats requested for a range starting in the future");
        }

        let Some(uris) = query.uri_filter() else {
            return Ok(self.fetch_chunk(query, None).await);
        };

        let mut stats = Vec::new();
        for chunk in uris.chunks(self.max_uris_per_query) {
            stats.extend(self.fetch_chunk(query, Some(chunk)).await);
        }
        Ok(stats)
    }

    async fn fetch_chunk(&self, query: &StatsQuery, uris: Option<&[String]>) -> Vec<ViewStat> {
        match self
            .retry
            .run("get_stats", move |_| self.fetch_stats_once(query, uris))
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!(
                    uris = uris.map(|u| u.len()).unwrap_or(0),
                    error = %e,
                    "stats sub-query failed"
                );
                Vec::new()
            }
        }
    }

    /// Unique-visitor view counts keyed by entity id. Every input id is
    /// present in the result; anything the service cannot answer counts as 0.
    pub async fn get_views_for_entities(&self, ids: &[i64]) -> HashMap<i64, i64> {
        let mut views: HashMap<i64, i64> = ids.iter().map(|id| (*id, 0)).collect();
        if ids.is_empty() {
            return views;
        }

        let end = now_utc();
        let start = ChronoDuration::try_days(self.max_range_days)
            .and_then(|window| end.checked_sub_signed(window))
            .unwrap_or(NaiveDateTime::MIN);
        let uris = views
            .keys()
            .map(|id| format!("{}{}", self.uri_prefix, id))
            .collect();
        let query = StatsQuery::new(start, end).with_uris(uris).unique(true);

        let stats = match self.get_stats(&query).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "view lookup rejected, reporting zero views");
                return views;
            }
        };

        for stat in stats {
            let Some(id) = stat
                .uri
                .strip_prefix(self.uri_prefix.as_str())
                .and_then(|rest| rest.parse::<i64>().ok())
            else {
                warn!(uri = %stat.uri, "ignoring stat with malformed entity uri");
                continue;
            };
            if let Some(count) = views.get_mut(&id) {
                *count += stat.hits;
            }
        }

        views
    }

    /// Whether the stats service answers its health check
    pub async fn ping(&self) -> bool {
        match self.health_once().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "stats service ping failed");
                false
            }
        }
    }
}
